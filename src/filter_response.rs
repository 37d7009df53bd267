//! Per-tile matched-filter response curve Q(θ₅₀₀).
//!
//! The matched filter recovers a different fraction of the true signal
//! depending on the angular size of the cluster relative to the filter
//! scale. Q is measured per tile by injecting model profiles of known
//! θ₅₀₀, and consumed here as a fitted (θ, Q) table evaluated through a
//! cubic spline.

use crate::algo::spline::{CubicSpline, SplineError};
use serde::{Deserialize, Serialize};

/// Serializable (θ₅₀₀, Q) table, the artifact form exchanged with the
/// filter-fitting stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResponseTable {
    /// Cluster angular scales in arcmin, strictly ascending.
    pub theta500_arcmin: Vec<f64>,
    /// Relative filter amplitude at each scale.
    pub q: Vec<f64>,
}

/// Spline evaluator over a measured filter-response table.
#[derive(Debug, Clone)]
pub struct FilterResponse {
    spline: CubicSpline,
}

impl FilterResponse {
    /// Fit a response curve through the given table.
    pub fn from_table(table: &FilterResponseTable) -> Result<Self, SplineError> {
        let spline = CubicSpline::new(table.theta500_arcmin.clone(), table.q.clone())?;
        Ok(Self { spline })
    }

    /// A flat Q ≡ 1 response, useful when the filter has no scale
    /// dependence (and in tests).
    pub fn unity() -> Self {
        let spline = CubicSpline::new(vec![0.0, 30.0], vec![1.0, 1.0])
            .expect("static two-point table is valid");
        Self { spline }
    }

    /// Relative filter amplitude at the given cluster angular scale.
    /// Clamped to the boundary values outside the fitted range.
    pub fn at(&self, theta500_arcmin: f64) -> f64 {
        self.spline.evaluate(theta500_arcmin)
    }
}
