//! Trainable claim model and its persisted artifact.

pub mod artifact;
pub mod wrapper;

pub use artifact::*;
pub use wrapper::*;
