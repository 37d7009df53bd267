//! Natural cubic spline interpolation.
//!
//! Used for the filter-response curve Q(θ₅₀₀) and for inverting the NFW
//! enclosed-mass shape function, both of which are smooth, monotone tables
//! that get evaluated many times per completeness run.

use thiserror::Error;

/// Errors raised when constructing a spline from a data table.
#[derive(Debug, Error)]
pub enum SplineError {
    #[error("x and y tables must have the same length ({x_len} vs {y_len})")]
    LengthMismatch { x_len: usize, y_len: usize },

    #[error("need at least 2 points for interpolation, got {0}")]
    TooFewPoints(usize),

    #[error("x values must be strictly ascending (violation at index {0})")]
    NotAscending(usize),
}

/// Piecewise-cubic interpolant with natural boundary conditions
/// (second derivative zero at both endpoints).
///
/// Outside the fitted range the boundary value is returned rather than
/// extrapolating; the tables this crate fits (filter response, NFW shape
/// function) are flat or irrelevant beyond their measured domain.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    // [a, b, c, d] per segment: S(t) = a + b t + c t^2 + d t^3, t = x - x[i]
    coeffs: Vec<[f64; 4]>,
}

impl CubicSpline {
    /// Fit a natural cubic spline through `(x, y)` pairs.
    ///
    /// `x` must be strictly ascending and the same length as `y`.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, SplineError> {
        if x.len() != y.len() {
            return Err(SplineError::LengthMismatch {
                x_len: x.len(),
                y_len: y.len(),
            });
        }
        if x.len() < 2 {
            return Err(SplineError::TooFewPoints(x.len()));
        }
        for i in 1..x.len() {
            if x[i] <= x[i - 1] {
                return Err(SplineError::NotAscending(i));
            }
        }

        let coeffs = Self::solve_coefficients(&x, &y);
        Ok(Self { x, y, coeffs })
    }

    /// Thomas-algorithm solve of the tridiagonal system for the segment
    /// coefficients.
    fn solve_coefficients(x: &[f64], y: &[f64]) -> Vec<[f64; 4]> {
        let n = x.len();
        let mut h = vec![0.0; n - 1];
        for i in 0..n - 1 {
            h[i] = x[i + 1] - x[i];
        }

        let mut alpha = vec![0.0; n - 1];
        for i in 1..n - 1 {
            alpha[i] =
                (3.0 / h[i]) * (y[i + 1] - y[i]) - (3.0 / h[i - 1]) * (y[i] - y[i - 1]);
        }

        let mut l = vec![1.0; n];
        let mut mu = vec![0.0; n];
        let mut z = vec![0.0; n];
        for i in 1..n - 1 {
            l[i] = 2.0 * (x[i + 1] - x[i - 1]) - h[i - 1] * mu[i - 1];
            mu[i] = h[i] / l[i];
            z[i] = (alpha[i] - h[i - 1] * z[i - 1]) / l[i];
        }

        let mut c = vec![0.0; n];
        let mut b = vec![0.0; n - 1];
        let mut d = vec![0.0; n - 1];
        for j in (0..n - 1).rev() {
            c[j] = z[j] - mu[j] * c[j + 1];
            b[j] = (y[j + 1] - y[j]) / h[j] - h[j] * (c[j + 1] + 2.0 * c[j]) / 3.0;
            d[j] = (c[j + 1] - c[j]) / (3.0 * h[j]);
        }

        (0..n - 1).map(|i| [y[i], b[i], c[i], d[i]]).collect()
    }

    /// Evaluate the spline at `x`, clamping to the boundary values outside
    /// the fitted range.
    pub fn evaluate(&self, x: f64) -> f64 {
        if x <= self.x[0] {
            return self.y[0];
        }
        if x >= *self.x.last().unwrap() {
            return *self.y.last().unwrap();
        }

        let segment = self.find_segment(x);
        let dx = x - self.x[segment];
        let [a, b, c, d] = self.coeffs[segment];
        a + b * dx + c * dx * dx + d * dx * dx * dx
    }

    fn find_segment(&self, x: f64) -> usize {
        let mut left = 0;
        let mut right = self.x.len() - 1;
        while left < right - 1 {
            let mid = (left + right) / 2;
            if x < self.x[mid] {
                right = mid;
            } else {
                left = mid;
            }
        }
        left
    }
}
