//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the columnar table the pipeline operates on (`Frame`, `Column`)
//! - the model kind (`ModelKind`)
//! - run configuration (`TrainConfig` and its sections)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
