//! Numerical building blocks: summary statistics and the Gaussian-process
//! surrogate used by the hyperparameter search.

pub mod gp;
pub mod stats;

pub use gp::GaussianProcess;
