//! Monotone constraints on leaf weights.
//!
//! Each node carries `[lower, upper]` bounds inherited from its ancestors.
//! Splitting on a constrained feature is accepted only when the child weights
//! are ordered the right way; the children then get bounds separated at the
//! midpoint of the two weights, so every leaf to the left of the split stays
//! on the correct side of every leaf to the right.

use serde::{Deserialize, Serialize};

/// Expected direction of the prediction as a feature grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonotoneDirection {
    #[default]
    None,
    Increasing,
    Decreasing,
}

impl MonotoneDirection {
    /// `1` increasing, `-1` decreasing, anything else unconstrained.
    pub fn from_int(value: i8) -> Self {
        match value {
            1 => Self::Increasing,
            -1 => Self::Decreasing,
            _ => Self::None,
        }
    }

    pub fn as_int(self) -> i8 {
        match self {
            Self::None => 0,
            Self::Increasing => 1,
            Self::Decreasing => -1,
        }
    }

    #[inline]
    pub fn is_constrained(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether left/right child weights respect this direction.
    #[inline]
    pub fn allows(self, left: f64, right: f64) -> bool {
        match self {
            Self::None => true,
            Self::Increasing => left <= right,
            Self::Decreasing => left >= right,
        }
    }
}

/// Allowed range of a node's (unscaled) leaf weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightBounds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl WeightBounds {
    pub fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    #[inline]
    pub fn clamp(&self, weight: f64) -> f64 {
        weight.max(self.lower).min(self.upper)
    }

    /// Bounds for the (left, right) children of a split at `mid`.
    pub fn child_bounds(&self, direction: MonotoneDirection, mid: f64) -> (WeightBounds, WeightBounds) {
        let below = WeightBounds {
            lower: self.lower,
            upper: mid.min(self.upper),
        };
        let above = WeightBounds {
            lower: mid.max(self.lower),
            upper: self.upper,
        };
        match direction {
            MonotoneDirection::None => (*self, *self),
            MonotoneDirection::Increasing => (below, above),
            MonotoneDirection::Decreasing => (above, below),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip_and_fallback() {
        for d in [
            MonotoneDirection::None,
            MonotoneDirection::Increasing,
            MonotoneDirection::Decreasing,
        ] {
            assert_eq!(MonotoneDirection::from_int(d.as_int()), d);
        }
        assert_eq!(MonotoneDirection::from_int(5), MonotoneDirection::None);
    }

    #[test]
    fn child_bounds_split_at_midpoint() {
        let root = WeightBounds::unbounded();
        let (l, r) = root.child_bounds(MonotoneDirection::Increasing, 0.5);
        assert_eq!(l.upper, 0.5);
        assert_eq!(r.lower, 0.5);
        assert_eq!(l.clamp(2.0), 0.5);

        let (l, r) = root.child_bounds(MonotoneDirection::Decreasing, 0.5);
        assert_eq!(l.lower, 0.5);
        assert_eq!(r.upper, 0.5);
    }

    #[test]
    fn nested_bounds_only_tighten() {
        let parent = WeightBounds { lower: -1.0, upper: 1.0 };
        let (l, _) = parent.child_bounds(MonotoneDirection::Increasing, 3.0);
        assert_eq!(l.upper, 1.0);
    }
}
