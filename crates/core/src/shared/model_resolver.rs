use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("model {0} not found locally and no download URL configured")]
    Unavailable(String),
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where to look for a model file.
pub struct ModelLocation<'a> {
    pub name: &'a str,
    /// Used as-is when set; nothing else is consulted.
    pub explicit_path: Option<&'a Path>,
    pub bundled_dir: Option<&'a Path>,
    pub url: Option<&'a str>,
}

/// Resolve a model file, checking local locations before downloading.
///
/// Resolution order:
/// 1. Explicit path
/// 2. User cache directory (platform-specific)
/// 3. Bundled directory
/// 4. Download from URL into the cache
pub fn resolve(
    location: &ModelLocation<'_>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = location.explicit_path {
        return Ok(path.to_path_buf());
    }

    let cache_dir = model_cache_dir()?;
    resolve_in(location, &cache_dir, progress)
}

fn resolve_in(
    location: &ModelLocation<'_>,
    cache_dir: &Path,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(location.name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    if let Some(dir) = location.bundled_dir {
        let bundled_path = dir.join(location.name);
        if bundled_path.exists() {
            return Ok(bundled_path);
        }
    }

    let Some(url) = location.url else {
        return Err(ModelResolveError::Unavailable(location.name.to_string()));
    };

    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading {} from {url}", location.name);
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Liveliness/models/`
/// - Linux: `$XDG_CACHE_HOME/Liveliness/models/` or `~/.cache/Liveliness/models/`
/// - Windows: `%LOCALAPPDATA%/Liveliness/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Liveliness").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Liveliness").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let bytes = response.bytes().map_err(|e| ModelResolveError::Download {
        url: url.to_string(),
        source: e,
    })?;

    // Write to a temp file first, then rename for atomicity
    let temp_path = dest.with_extension("part");
    let write_err = |source| ModelResolveError::Write {
        path: temp_path.clone(),
        source,
    };
    let mut file = fs::File::create(&temp_path).map_err(write_err)?;

    for chunk in bytes.chunks(1024 * 1024) {
        file.write_all(chunk).map_err(write_err)?;
        downloaded += chunk.len() as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
