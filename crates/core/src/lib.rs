//! Face liveliness detection: camera frames in, a lively / not-lively
//! verdict out.
//!
//! The crate follows a domain/infrastructure split per concern. Domain
//! modules hold the traits and pure logic; infrastructure modules bind
//! them to ffmpeg, ONNX Runtime and the filesystem. [`session`] wires the
//! pieces into a running detection loop.

pub mod capture;
pub mod detection;
pub mod liveliness;
pub mod presentation;
pub mod session;
pub mod shared;
