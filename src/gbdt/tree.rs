//! Regression tree storage and traversal.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum Node {
    /// `x[feature] <= threshold` goes left; `NaN` follows `default_left`.
    Split {
        feature: usize,
        threshold: f64,
        default_left: bool,
        left: usize,
        right: usize,
        gain: f64,
    },
    /// Contribution to the margin (already scaled by the learning rate).
    Leaf { value: f64 },
}

/// Flat node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub(crate) nodes: Vec<Node>,
}

impl Tree {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], i: usize) -> usize {
            match &nodes[i] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    /// Leaf value reached by `row` of `x`.
    pub fn predict_row(&self, x: &DMatrix<f64>, row: usize) -> f64 {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    default_left,
                    left,
                    right,
                    ..
                } => {
                    let v = x[(row, *feature)];
                    let go_left = if v.is_nan() { *default_left } else { v <= *threshold };
                    i = if go_left { *left } else { *right };
                }
            }
        }
    }

    /// Accumulate split gain per feature into `out`.
    pub fn add_gain(&self, out: &mut [f64]) {
        for node in &self.nodes {
            if let Node::Split { feature, gain, .. } = node {
                if let Some(slot) = out.get_mut(*feature) {
                    *slot += gain;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        Tree {
            nodes: vec![
                Node::Split {
                    feature: 0,
                    threshold: 1.0,
                    default_left: false,
                    left: 1,
                    right: 2,
                    gain: 3.0,
                },
                Node::Leaf { value: -0.5 },
                Node::Leaf { value: 0.5 },
            ],
        }
    }

    #[test]
    fn traversal_follows_threshold_and_default() {
        let t = stump();
        let x = DMatrix::from_column_slice(3, 1, &[1.0, 2.0, f64::NAN]);
        assert_eq!(t.predict_row(&x, 0), -0.5);
        assert_eq!(t.predict_row(&x, 1), 0.5);
        assert_eq!(t.predict_row(&x, 2), 0.5);
        assert_eq!(t.depth(), 1);
        assert_eq!(t.n_leaves(), 2);
    }

    #[test]
    fn gain_is_attributed_to_split_feature() {
        let mut gain = vec![0.0; 2];
        stump().add_gain(&mut gain);
        assert_eq!(gain, vec![3.0, 0.0]);
    }
}
