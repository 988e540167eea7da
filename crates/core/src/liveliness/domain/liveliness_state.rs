use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

/// What readers see of the session's liveliness.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LivelinessStatus {
    #[default]
    NotLively,
    Lively,
    /// The session failed and no verdict can be produced.
    Unavailable,
}

impl LivelinessStatus {
    pub fn from_verdict(lively: bool) -> Self {
        if lively {
            LivelinessStatus::Lively
        } else {
            LivelinessStatus::NotLively
        }
    }

    pub fn is_lively(&self) -> bool {
        matches!(self, LivelinessStatus::Lively)
    }
}

impl std::fmt::Display for LivelinessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LivelinessStatus::NotLively => write!(f, "Not Lively"),
            LivelinessStatus::Lively => write!(f, "Lively"),
            LivelinessStatus::Unavailable => write!(f, "Unavailable"),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    generation: u64,
    status: LivelinessStatus,
}

/// Session-wide liveliness verdict shared between the detection loop
/// (the only writer) and any number of readers.
///
/// Writes carry the generation they were issued under. [`retire`] moves
/// the state to a new generation, after which writes from the old one
/// are ignored; the generation check and the write happen under the
/// same lock.
///
/// [`retire`]: LivelinessState::retire
#[derive(Clone, Debug, Default)]
pub struct LivelinessState {
    inner: Arc<Mutex<Inner>>,
}

impl LivelinessState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> LivelinessStatus {
        self.lock().status
    }

    pub fn is_lively(&self) -> bool {
        self.status().is_lively()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Records a verdict. Returns `false` (and changes nothing) when
    /// `generation` has been retired.
    pub fn publish(&self, generation: u64, lively: bool) -> bool {
        self.set_if_current(generation, LivelinessStatus::from_verdict(lively))
    }

    /// Marks the session as unable to produce verdicts.
    pub fn mark_unavailable(&self, generation: u64) -> bool {
        self.set_if_current(generation, LivelinessStatus::Unavailable)
    }

    /// Starts a new generation with a fresh `NotLively` status.
    pub fn reset(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.status = LivelinessStatus::NotLively;
        inner.generation
    }

    /// Invalidates all writers holding the current generation or older and
    /// returns the new generation. The status is left as it was.
    pub fn retire(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.generation
    }

    fn set_if_current(&self, generation: u64, status: LivelinessStatus) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.status = status;
        true
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // `Inner` is updated in single assignments, so a poisoned lock still holds a valid value.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_not_lively() {
        let state = LivelinessState::new();
        assert_eq!(state.status(), LivelinessStatus::NotLively);
        assert!(!state.is_lively());
    }

    #[test]
    fn test_publish_overwrites() {
        let state = LivelinessState::new();
        let gen = state.generation();
        assert!(state.publish(gen, true));
        assert!(state.is_lively());
        assert!(state.publish(gen, false));
        assert!(!state.is_lively());
    }

    #[test]
    fn test_retired_generation_cannot_write() {
        let state = LivelinessState::new();
        let old = state.generation();
        let new = state.retire();
        assert_ne!(old, new);

        assert!(!state.publish(old, true));
        assert_eq!(state.status(), LivelinessStatus::NotLively);

        assert!(state.publish(new, true));
        assert!(state.is_lively());
    }

    #[test]
    fn test_reset_clears_status_and_fences_old_writer() {
        let state = LivelinessState::new();
        let old = state.generation();
        state.mark_unavailable(old);

        let new = state.reset();
        assert_eq!(state.status(), LivelinessStatus::NotLively);
        assert!(!state.publish(old, true));
        assert!(state.publish(new, true));
    }

    #[test]
    fn test_clones_share_state() {
        let writer = LivelinessState::new();
        let reader = writer.clone();
        writer.publish(writer.generation(), true);
        assert!(reader.is_lively());
    }

    #[test]
    fn test_unavailable_is_distinct_from_not_lively() {
        let state = LivelinessState::new();
        assert!(state.mark_unavailable(state.generation()));
        assert_eq!(state.status(), LivelinessStatus::Unavailable);
        assert!(!state.is_lively());
        assert_ne!(state.status(), LivelinessStatus::NotLively);
    }

    #[test]
    fn test_status_display_matches_ui_labels() {
        assert_eq!(LivelinessStatus::Lively.to_string(), "Lively");
        assert_eq!(LivelinessStatus::NotLively.to_string(), "Not Lively");
        assert_eq!(LivelinessStatus::Unavailable.to_string(), "Unavailable");
    }
}
