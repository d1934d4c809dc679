//! Monotone-constraint derivation from feature names.
//!
//! Banded attributes are one-hot encoded with human-authored labels such as
//! `"A. Below 10"` or `"C. From 50"`. The label tells us which way the claim
//! rate is expected to move, so each output feature gets a direction:
//!
//! 1. an explicit `feature -> direction` entry, if configured
//! 2. `-1` if the name contains a decreasing marker (default `"Below"`)
//! 3. `+1` if the name contains an increasing marker (defaults `"From"`,
//!    `"Unknown"`, `"HIST_LOSS_RATIO"`)
//! 4. `0` otherwise

use serde::{Deserialize, Serialize};

use crate::domain::ConstraintConfig;
use crate::gbdt::MonotoneDirection;

/// How many features fell into each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSummary {
    pub increasing: usize,
    pub decreasing: usize,
    pub unconstrained: usize,
}

/// One direction per output feature, in feature order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonotoneConstraints {
    pub directions: Vec<MonotoneDirection>,
    pub summary: ConstraintSummary,
}

impl MonotoneConstraints {
    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    pub fn as_ints(&self) -> Vec<i8> {
        self.directions.iter().map(|d| d.as_int()).collect()
    }

    /// Tuple-style rendering, e.g. `"(-1,1,0)"`.
    pub fn to_constraint_string(&self) -> String {
        let parts: Vec<String> = self.directions.iter().map(|d| d.as_int().to_string()).collect();
        format!("({})", parts.join(","))
    }
}

/// Derive constraints for `feature_names` using `rules`.
pub fn build_constraints(feature_names: &[String], rules: &ConstraintConfig) -> MonotoneConstraints {
    let directions: Vec<MonotoneDirection> = feature_names
        .iter()
        .map(|name| direction_for(name, rules))
        .collect();

    let mut summary = ConstraintSummary::default();
    for d in &directions {
        match d {
            MonotoneDirection::Increasing => summary.increasing += 1,
            MonotoneDirection::Decreasing => summary.decreasing += 1,
            MonotoneDirection::None => summary.unconstrained += 1,
        }
    }

    MonotoneConstraints { directions, summary }
}

fn direction_for(name: &str, rules: &ConstraintConfig) -> MonotoneDirection {
    if let Some(&dir) = rules.explicit.get(name) {
        return MonotoneDirection::from_int(dir);
    }
    if rules.decreasing_markers.iter().any(|m| contains(name, m, rules.case_insensitive)) {
        return MonotoneDirection::Decreasing;
    }
    if rules.increasing_markers.iter().any(|m| contains(name, m, rules.case_insensitive)) {
        return MonotoneDirection::Increasing;
    }
    MonotoneDirection::None
}

fn contains(haystack: &str, needle: &str, case_insensitive: bool) -> bool {
    if needle.is_empty() {
        return false;
    }
    if case_insensitive {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    } else {
        haystack.contains(needle)
    }
}
