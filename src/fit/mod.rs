//! Hyperparameter search.
//!
//! Responsibilities:
//!
//! - map declared dimensions to and from the unit cube
//! - run the GP / Expected Improvement trial loop
//! - turn trials into booster fits scored on the validation partition

pub mod optimizer;
pub mod space;
pub mod tuning;

pub use optimizer::*;
pub use space::*;
pub use tuning::*;
