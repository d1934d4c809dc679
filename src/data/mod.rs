//! Input data beyond plain CSV ingest.
//!
//! - account/claims joins (`assemble`)
//! - seeded synthetic portfolio (`sample`)

pub mod assemble;
pub mod sample;

pub use assemble::*;
pub use sample::*;
