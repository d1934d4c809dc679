//! Hyperparameter search space.
//!
//! Every dimension maps to `[0, 1]`. The optimizer works entirely in the unit
//! cube and only decodes points into named values when calling the objective:
//!
//! - `Integer {low, high}`: `[0, 1]` is cut into `high - low + 1` equal cells
//! - `Real` with `Uniform` prior: linear interpolation
//! - `Real` with `LogUniform` prior: log-spaced, the same spacing rule used for
//!   any positive scale parameter

use std::collections::{BTreeMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{DimensionSpec, Prior};
use crate::error::AppError;

/// One decoded hyperparameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Real(f64),
}

impl ParamValue {
    pub fn as_f64(self) -> f64 {
        match self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Real(v) => v,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Real(v) => write!(f, "{v:.6}"),
        }
    }
}

/// Named hyperparameter values, ordered by name.
pub type Params = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    dims: Vec<DimensionSpec>,
}

impl SearchSpace {
    pub fn new(dims: Vec<DimensionSpec>) -> Result<Self, AppError> {
        if dims.is_empty() {
            return Err(AppError::config("Search space has no dimensions."));
        }
        let mut seen = HashSet::new();
        for dim in &dims {
            if !seen.insert(dim.name().to_string()) {
                return Err(AppError::config(format!("Duplicate search dimension `{}`.", dim.name())));
            }
            match dim {
                DimensionSpec::Integer { name, low, high } => {
                    if low > high {
                        return Err(AppError::config(format!(
                            "Dimension `{name}`: low={low} exceeds high={high}."
                        )));
                    }
                }
                DimensionSpec::Real { name, low, high, prior } => {
                    if !(low.is_finite() && high.is_finite() && low <= high) {
                        return Err(AppError::config(format!(
                            "Dimension `{name}`: invalid range [{low}, {high}]."
                        )));
                    }
                    if *prior == Prior::LogUniform && *low <= 0.0 {
                        return Err(AppError::config(format!(
                            "Dimension `{name}`: log-uniform prior needs low > 0 (got {low})."
                        )));
                    }
                }
            }
        }
        Ok(Self { dims })
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn dimensions(&self) -> &[DimensionSpec] {
        &self.dims
    }

    /// Uniform point in the unit cube.
    pub fn sample_unit<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        (0..self.dims.len()).map(|_| rng.gen_range(0.0..1.0)).collect()
    }

    /// Decode a unit-cube point into named values.
    pub fn decode(&self, u: &[f64]) -> Params {
        self.dims
            .iter()
            .zip(u)
            .map(|(dim, &ui)| (dim.name().to_string(), decode_one(dim, ui.clamp(0.0, 1.0))))
            .collect()
    }

    /// Unit-cube coordinates of the point actually evaluated (integers snap
    /// to the centre of their cell).
    pub fn snap(&self, u: &[f64]) -> Vec<f64> {
        let params = self.decode(u);
        self.dims
            .iter()
            .zip(u)
            .map(|(dim, &ui)| match (dim, params.get(dim.name())) {
                (DimensionSpec::Integer { low, high, .. }, Some(ParamValue::Int(v))) => {
                    let cells = (high - low + 1) as f64;
                    ((v - low) as f64 + 0.5) / cells
                }
                _ => ui.clamp(0.0, 1.0),
            })
            .collect()
    }
}

fn decode_one(dim: &DimensionSpec, u: f64) -> ParamValue {
    match dim {
        DimensionSpec::Integer { low, high, .. } => {
            let cells = (high - low + 1) as f64;
            let offset = (u * cells).floor() as i64;
            ParamValue::Int((low + offset).min(*high))
        }
        DimensionSpec::Real { low, high, prior, .. } => {
            let v = match prior {
                Prior::Uniform => low + u * (high - low),
                Prior::LogUniform => (low.ln() + u * (high.ln() - low.ln())).exp(),
            };
            ParamValue::Real(v.clamp(*low, *high))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::default_dimensions;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn integer_cells_cover_the_range() {
        let space = SearchSpace::new(vec![DimensionSpec::Integer {
            name: "max_depth".into(),
            low: 2,
            high: 4,
        }])
        .unwrap();
        let decoded: Vec<ParamValue> = [0.0, 0.34, 0.99, 1.0]
            .iter()
            .map(|&u| space.decode(&[u])["max_depth"])
            .collect();
        assert_eq!(
            decoded,
            vec![ParamValue::Int(2), ParamValue::Int(3), ParamValue::Int(4), ParamValue::Int(4)]
        );
        assert!((space.snap(&[0.99])[0] - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn log_uniform_midpoint_is_geometric_mean() {
        let space = SearchSpace::new(vec![DimensionSpec::Real {
            name: "reg_lambda".into(),
            low: 0.01,
            high: 1.0,
            prior: Prior::LogUniform,
        }])
        .unwrap();
        let v = space.decode(&[0.5])["reg_lambda"].as_f64();
        assert!((v - 0.1).abs() < 1e-12);
    }

    #[test]
    fn decoded_samples_stay_in_bounds() {
        let space = SearchSpace::new(default_dimensions()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let params = space.decode(&space.sample_unit(&mut rng));
            for dim in space.dimensions() {
                let v = params[dim.name()].as_f64();
                match dim {
                    DimensionSpec::Integer { low, high, .. } => assert!(v >= *low as f64 && v <= *high as f64),
                    DimensionSpec::Real { low, high, .. } => assert!(v >= *low && v <= *high),
                }
            }
        }
    }

    #[test]
    fn rejects_bad_dimensions() {
        let dup = vec![
            DimensionSpec::Integer { name: "a".into(), low: 1, high: 2 },
            DimensionSpec::Integer { name: "a".into(), low: 1, high: 2 },
        ];
        assert!(SearchSpace::new(dup).is_err());
        let log_zero = vec![DimensionSpec::Real {
            name: "gamma".into(),
            low: 0.0,
            high: 1.0,
            prior: Prior::LogUniform,
        }];
        assert!(SearchSpace::new(log_zero).is_err());
    }
}
