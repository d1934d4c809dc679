//! Depth-wise histogram tree growth.
//!
//! For a node with gradient sum `G` and hessian sum `H` the leaf weight is
//! the minimizer of `G w + 1/2 (H + lambda) w^2 + alpha |w|` (soft-thresholded
//! Newton step), clamped to the node's monotone bounds. A split's gain is the
//! drop in that objective from parent to children; splits with gain below
//! `gamma`, a child hessian below `min_child_weight`, or child weights that
//! contradict a monotone direction are rejected.
//!
//! Split search is parallel across features; the reduction keeps the highest
//! gain and breaks ties by the lowest feature index, so results do not depend
//! on thread scheduling.

use rayon::prelude::*;

use crate::gbdt::binning::{BinnedMatrix, MISSING_BIN};
use crate::gbdt::monotone::{MonotoneDirection, WeightBounds};
use crate::gbdt::tree::{Node, Tree};

/// Per-tree growth settings.
#[derive(Debug, Clone)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub learning_rate: f64,
    pub min_child_weight: f64,
    pub reg_alpha: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct GradSum {
    g: f64,
    h: f64,
}

impl GradSum {
    #[inline]
    fn add(&mut self, g: f64, h: f64) {
        self.g += g;
        self.h += h;
    }

    #[inline]
    fn minus(self, other: GradSum) -> GradSum {
        GradSum {
            g: self.g - other.g,
            h: self.h - other.h,
        }
    }
}

#[derive(Debug, Clone)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    threshold: f64,
    default_left: bool,
    gain: f64,
    left_weight: f64,
    right_weight: f64,
}

pub(crate) struct TreeGrower<'a> {
    binned: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    directions: &'a [MonotoneDirection],
    params: &'a TreeParams,
}

impl<'a> TreeGrower<'a> {
    pub fn new(
        binned: &'a BinnedMatrix,
        grad: &'a [f64],
        hess: &'a [f64],
        features: &'a [usize],
        directions: &'a [MonotoneDirection],
        params: &'a TreeParams,
    ) -> Self {
        Self {
            binned,
            grad,
            hess,
            features,
            directions,
            params,
        }
    }

    /// Grow one tree over `rows`.
    pub fn grow(&self, rows: Vec<usize>) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(rows, 0, WeightBounds::unbounded(), &mut nodes);
        Tree { nodes }
    }

    fn build_node(&self, rows: Vec<usize>, depth: usize, bounds: WeightBounds, nodes: &mut Vec<Node>) -> usize {
        let total = self.sum(&rows);
        let weight = self.leaf_weight(total, bounds);
        let current = nodes.len();
        nodes.push(Node::Leaf {
            value: weight * self.params.learning_rate,
        });

        if depth >= self.params.max_depth || rows.len() < 2 {
            return current;
        }
        let Some(split) = self.find_best_split(&rows, total, bounds) else {
            return current;
        };

        let feature = split.feature;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.into_iter().partition(|&r| {
            let code = self.binned.code(feature, r);
            if code == MISSING_BIN {
                split.default_left
            } else {
                usize::from(code) <= split.bin
            }
        });

        let direction = self.direction(feature);
        let mid = 0.5 * (split.left_weight + split.right_weight);
        let (left_bounds, right_bounds) = bounds.child_bounds(direction, mid);

        let left = self.build_node(left_rows, depth + 1, left_bounds, nodes);
        let right = self.build_node(right_rows, depth + 1, right_bounds, nodes);
        nodes[current] = Node::Split {
            feature,
            threshold: split.threshold,
            default_left: split.default_left,
            left,
            right,
            gain: split.gain,
        };
        current
    }

    fn find_best_split(&self, rows: &[usize], total: GradSum, bounds: WeightBounds) -> Option<SplitCandidate> {
        let parent_weight = self.leaf_weight(total, bounds);
        let parent_loss = self.loss_at(total, parent_weight);

        let candidates: Vec<Option<SplitCandidate>> = self
            .features
            .par_iter()
            .map(|&f| self.best_split_for_feature(f, rows, total, bounds, parent_loss))
            .collect();

        candidates
            .into_iter()
            .flatten()
            .fold(None, |best: Option<SplitCandidate>, c| match best {
                Some(b) if b.gain > c.gain || (b.gain == c.gain && b.feature <= c.feature) => Some(b),
                _ => Some(c),
            })
    }

    fn best_split_for_feature(
        &self,
        f: usize,
        rows: &[usize],
        total: GradSum,
        bounds: WeightBounds,
        parent_loss: f64,
    ) -> Option<SplitCandidate> {
        let n_bins = self.binned.n_bins(f);
        if n_bins < 2 {
            return None;
        }

        let mut hist = vec![GradSum::default(); n_bins];
        let mut missing = GradSum::default();
        for &r in rows {
            let code = self.binned.code(f, r);
            if code == MISSING_BIN {
                missing.add(self.grad[r], self.hess[r]);
            } else {
                hist[usize::from(code)].add(self.grad[r], self.hess[r]);
            }
        }

        let direction = self.direction(f);
        let has_missing = missing.h > 0.0;
        let cuts = self.binned.cuts(f);
        let mut best: Option<SplitCandidate> = None;
        let mut left_present = GradSum::default();

        // The last bin cannot be a left cut: nothing would go right.
        for (bin, &threshold) in cuts.iter().enumerate().take(n_bins - 1) {
            left_present.add(hist[bin].g, hist[bin].h);

            let defaults: &[bool] = if has_missing { &[false, true] } else { &[false] };
            for &default_left in defaults {
                let left = if default_left {
                    GradSum {
                        g: left_present.g + missing.g,
                        h: left_present.h + missing.h,
                    }
                } else {
                    left_present
                };
                let right = total.minus(left);
                if left.h < self.params.min_child_weight || right.h < self.params.min_child_weight {
                    continue;
                }

                let wl = self.leaf_weight(left, bounds);
                let wr = self.leaf_weight(right, bounds);
                if !direction.allows(wl, wr) {
                    continue;
                }

                let gain = parent_loss - self.loss_at(left, wl) - self.loss_at(right, wr);
                if !(gain.is_finite() && gain > self.params.gamma && gain > 1e-12) {
                    continue;
                }
                if best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature: f,
                        bin,
                        threshold,
                        default_left,
                        gain,
                        left_weight: wl,
                        right_weight: wr,
                    });
                }
            }
        }
        best
    }

    fn sum(&self, rows: &[usize]) -> GradSum {
        let mut s = GradSum::default();
        for &r in rows {
            s.add(self.grad[r], self.hess[r]);
        }
        s
    }

    fn direction(&self, f: usize) -> MonotoneDirection {
        self.directions.get(f).copied().unwrap_or_default()
    }

    fn leaf_weight(&self, s: GradSum, bounds: WeightBounds) -> f64 {
        let alpha = self.params.reg_alpha;
        let shrunk = if s.g > alpha {
            s.g - alpha
        } else if s.g < -alpha {
            s.g + alpha
        } else {
            0.0
        };
        let denom = s.h + self.params.reg_lambda;
        if denom <= 0.0 {
            return bounds.clamp(0.0);
        }
        bounds.clamp(-shrunk / denom)
    }

    fn loss_at(&self, s: GradSum, w: f64) -> f64 {
        s.g * w + 0.5 * (s.h + self.params.reg_lambda) * w * w + self.params.reg_alpha * w.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: 3,
            learning_rate: 1.0,
            min_child_weight: 0.0,
            reg_alpha: 0.0,
            reg_lambda: 0.0,
            gamma: 0.0,
        }
    }

    /// Squared-error gradients at margin 0: g = -y, h = 1.
    fn gradients(y: &[f64]) -> (Vec<f64>, Vec<f64>) {
        (y.iter().map(|v| -v).collect(), vec![1.0; y.len()])
    }

    #[test]
    fn stump_separates_step_function() {
        let x = DMatrix::from_column_slice(6, 1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let y = [0.0, 0.0, 0.0, 10.0, 10.0, 10.0];
        let binned = BinnedMatrix::from_matrix(&x, 64);
        let (g, h) = gradients(&y);
        let p = TreeParams { max_depth: 1, ..params() };
        let tree = TreeGrower::new(&binned, &g, &h, &[0], &[], &p).grow((0..6).collect());

        assert_eq!(tree.predict_row(&x, 0), 0.0);
        assert_eq!(tree.predict_row(&x, 5), 10.0);
        match &tree.nodes()[0] {
            Node::Split { threshold, .. } => assert_eq!(*threshold, 3.0),
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn decreasing_constraint_blocks_increasing_split() {
        let x = DMatrix::from_column_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let y = [0.0, 0.0, 5.0, 5.0];
        let binned = BinnedMatrix::from_matrix(&x, 64);
        let (g, h) = gradients(&y);
        let p = params();
        let dirs = [MonotoneDirection::Decreasing];
        let tree = TreeGrower::new(&binned, &g, &h, &[0], &dirs, &p).grow((0..4).collect());
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn gamma_prunes_weak_splits() {
        let x = DMatrix::from_column_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let y = [0.0, 0.1, 0.0, 0.1];
        let binned = BinnedMatrix::from_matrix(&x, 64);
        let (g, h) = gradients(&y);
        let p = TreeParams { gamma: 1.0, ..params() };
        let tree = TreeGrower::new(&binned, &g, &h, &[0], &[], &p).grow((0..4).collect());
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn missing_values_learn_a_default_side() {
        let x = DMatrix::from_column_slice(6, 1, &[1.0, 2.0, 3.0, 4.0, f64::NAN, f64::NAN]);
        let y = [0.0, 0.0, 8.0, 8.0, 8.0, 8.0];
        let binned = BinnedMatrix::from_matrix(&x, 64);
        let (g, h) = gradients(&y);
        let p = TreeParams { max_depth: 1, ..params() };
        let tree = TreeGrower::new(&binned, &g, &h, &[0], &[], &p).grow((0..6).collect());
        assert_eq!(tree.predict_row(&x, 4), 8.0);
        assert_eq!(tree.predict_row(&x, 0), 0.0);
    }

    #[test]
    fn ties_prefer_lower_feature_index() {
        // Two identical columns produce identical gains.
        let col = [1.0, 2.0, 3.0, 4.0];
        let x = DMatrix::from_fn(4, 2, |r, _| col[r]);
        let y = [0.0, 0.0, 1.0, 1.0];
        let binned = BinnedMatrix::from_matrix(&x, 64);
        let (g, h) = gradients(&y);
        let p = TreeParams { max_depth: 1, ..params() };
        let tree = TreeGrower::new(&binned, &g, &h, &[0, 1], &[], &p).grow((0..4).collect());
        match &tree.nodes()[0] {
            Node::Split { feature, .. } => assert_eq!(*feature, 0),
            other => panic!("expected split, got {other:?}"),
        }
    }
}
