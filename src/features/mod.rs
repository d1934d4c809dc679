//! Feature engineering: column filter, preprocessing pipeline, and monotone
//! constraint derivation.

pub mod constraints;
pub mod filter;
pub mod pipeline;

pub use constraints::*;
pub use filter::*;
pub use pipeline::*;
