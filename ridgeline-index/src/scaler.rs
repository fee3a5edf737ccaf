//! # Min-Max Normalizer
//!
//! Per-dimension min/max scaling into [0, 1]. The parameters are fitted once
//! per index generation and then applied unchanged to every query, so build
//! time and query time see exactly the same arithmetic.
//!
//! A dimension whose values are all equal has `range == 0`; its range is
//! forced to 1.0, which keeps the scaled value at a constant 0 instead of
//! dividing by zero.

use serde::{Deserialize, Serialize};

use ridgeline_core::error::{Error, Result};
use ridgeline_core::Matrix;

/// Fitted scaling parameters of one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub range: Vec<f64>,
}

impl ScalerParams {
    /// Fit parameters over every row of `matrix`
    pub fn fit(matrix: &Matrix<f64>) -> Result<Self> {
        if matrix.is_empty() || matrix.dim() == 0 {
            return Err(Error::MissingData {
                what: "cannot fit normalization parameters on an empty matrix".to_string(),
            });
        }

        let dim = matrix.dim();
        let mut min = vec![f64::INFINITY; dim];
        let mut max = vec![f64::NEG_INFINITY; dim];

        for row in matrix.iter_rows() {
            for (j, &x) in row.iter().enumerate() {
                if x < min[j] {
                    min[j] = x;
                }
                if x > max[j] {
                    max[j] = x;
                }
            }
        }

        let range = min
            .iter()
            .zip(max.iter())
            .map(|(lo, hi)| {
                let r = hi - lo;
                if r == 0.0 {
                    1.0
                } else {
                    r
                }
            })
            .collect();

        Ok(Self { min, max, range })
    }

    pub fn dimension(&self) -> usize {
        self.min.len()
    }

    /// Dimensions whose range was forced to 1.0
    pub fn constant_dimensions(&self) -> usize {
        self.min
            .iter()
            .zip(self.max.iter())
            .filter(|(lo, hi)| lo == hi)
            .count()
    }

    /// Check the three arrays describe one valid scaler
    pub fn validate(&self) -> Result<()> {
        let dim = self.min.len();
        if dim == 0 || self.max.len() != dim || self.range.len() != dim {
            return Err(Error::corrupt(format!(
                "scaler arrays have mismatched lengths: min={}, max={}, range={}",
                self.min.len(),
                self.max.len(),
                self.range.len()
            )));
        }
        if let Some(j) = self.range.iter().position(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(Error::corrupt(format!("scaler range at dimension {} is not positive", j)));
        }
        Ok(())
    }

    /// Scale one build-time row (no clipping; the fitted envelope holds it)
    #[inline]
    pub fn scale_row_into(&self, raw: &[f64], out: &mut Vec<f32>) {
        out.extend(
            raw.iter()
                .zip(self.min.iter().zip(self.range.iter()))
                .map(|(x, (lo, r))| ((x - lo) / r) as f32),
        );
    }

    /// Normalize the whole build matrix
    pub fn transform_matrix(&self, matrix: &Matrix<f64>) -> Result<Matrix<f32>> {
        if matrix.dim() != self.dimension() {
            return Err(Error::dimension_mismatch(self.dimension(), matrix.dim()));
        }
        let mut out = Vec::with_capacity(matrix.rows() * matrix.dim());
        for row in matrix.iter_rows() {
            self.scale_row_into(row, &mut out);
        }
        Matrix::from_flat(out, matrix.rows(), matrix.dim())
    }

    /// Normalize one query vector, clipped to [0, 1]
    pub fn transform_query(&self, raw: &[f64]) -> Result<Vec<f32>> {
        if raw.len() != self.dimension() {
            return Err(Error::dimension_mismatch(self.dimension(), raw.len()));
        }
        Ok(raw
            .iter()
            .zip(self.min.iter().zip(self.range.iter()))
            .map(|(x, (lo, r))| ((x - lo) / r).clamp(0.0, 1.0) as f32)
            .collect())
    }
}

/// Holder for the active parameters; empty until fitted or loaded
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    params: Option<ScalerParams>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: ScalerParams) -> Self {
        Self { params: Some(params) }
    }

    /// Fit on `matrix`, keep the parameters and return the normalized matrix
    pub fn fit_transform(&mut self, matrix: &Matrix<f64>) -> Result<Matrix<f32>> {
        let params = ScalerParams::fit(matrix)?;
        let normalized = params.transform_matrix(matrix)?;
        self.params = Some(params);
        Ok(normalized)
    }

    pub fn params(&self) -> Result<&ScalerParams> {
        self.params.as_ref().ok_or(Error::NotBuilt)
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    pub fn into_params(self) -> Result<ScalerParams> {
        self.params.ok_or(Error::NotBuilt)
    }

    pub fn normalize_query(&self, raw: &[f64]) -> Result<Vec<f32>> {
        self.params()?.transform_query(raw)
    }
}
