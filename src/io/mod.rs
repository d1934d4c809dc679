//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - prediction, frame, and report exports (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
