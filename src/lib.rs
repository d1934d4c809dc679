//! Claim frequency and severity models for insurance pricing.
//!
//! The `claims` binary only parses arguments and calls [`app::run`]; all of
//! the modelling lives here. Modules, roughly in pipeline order:
//!
//! - `io` / `data`: CSV ingest and export, account/claims assembly, and a
//!   seeded synthetic portfolio
//! - `domain`: the columnar `Frame`, `ModelKind`, and `TrainConfig`
//! - `split`: train/validation/test partitioning
//! - `features`: one-hot preprocessing, the sparse-column filter, and
//!   monotone constraints derived from feature names
//! - `gbdt`: histogram boosted trees with monotone leaf bounds
//! - `fit` / `math`: Gaussian-process hyperparameter search and the numeric
//!   helpers behind it
//! - `model`: `ClaimModel` staging and the persisted artifact
//! - `report`: metrics, text summaries, and SVG diagnostics
//! - `cli` / `app`: argument parsing, logging, and command dispatch

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod features;
pub mod fit;
pub mod gbdt;
pub mod io;
pub mod math;
pub mod model;
pub mod report;
pub mod split;
