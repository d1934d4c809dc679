//! Histogram gradient-boosted regression trees with monotone constraints.
//!
//! The booster supports the two objectives the claim models need (Poisson
//! counts and squared error on log amounts), L1/L2 leaf regularization,
//! split-gain pruning, row and column subsampling, missing-value routing,
//! and early stopping on a validation set.

mod binning;
mod booster;
mod grower;
mod monotone;
mod objective;
mod tree;

pub use booster::{Booster, BoosterParams};
pub use monotone::{MonotoneDirection, WeightBounds};
pub use objective::Objective;
pub use tree::{Node, Tree};
