//! v1 API Data Transfer Objects.
//!
//! Wire types for the v1 REST API, kept apart from the `ocr` and
//! `telemetry` domain types they wrap.

pub mod ocr;
pub mod stats;

pub use ocr::*;
pub use stats::*;
