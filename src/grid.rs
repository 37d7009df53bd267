//! Shared (log₁₀ M, z) grid axes.
//!
//! Every completeness surface in a run is indexed by one grid instance;
//! consumers shape-check against it so surfaces from different runs can
//! never be mixed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("{axis} axis needs at least 2 points, got {len}")]
    TooFewPoints { axis: &'static str, len: usize },

    #[error("{axis} axis must be strictly ascending (violation at index {index})")]
    NotAscending { axis: &'static str, index: usize },
}

/// Ordered (log₁₀ mass, redshift) axes shared by all surfaces in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MzGrid {
    log10m: Vec<f64>,
    z: Vec<f64>,
}

fn check_axis(axis: &'static str, values: &[f64]) -> Result<(), GridError> {
    if values.len() < 2 {
        return Err(GridError::TooFewPoints {
            axis,
            len: values.len(),
        });
    }
    for i in 1..values.len() {
        if values[i] <= values[i - 1] {
            return Err(GridError::NotAscending { axis, index: i });
        }
    }
    Ok(())
}

impl MzGrid {
    pub fn new(log10m: Vec<f64>, z: Vec<f64>) -> Result<Self, GridError> {
        check_axis("log10m", &log10m)?;
        check_axis("z", &z)?;
        Ok(Self { log10m, z })
    }

    /// Evenly spaced axes over the given ranges. `n_m` mass points between
    /// the log-mass bounds; redshift from `z_min` to `z_max` inclusive in
    /// steps of `z_step`.
    pub fn from_ranges(
        log10m_min: f64,
        log10m_max: f64,
        n_m: usize,
        z_min: f64,
        z_max: f64,
        z_step: f64,
    ) -> Result<Self, GridError> {
        let dm = (log10m_max - log10m_min) / (n_m.saturating_sub(1).max(1)) as f64;
        let log10m = (0..n_m).map(|i| log10m_min + i as f64 * dm).collect();
        let n_z = ((z_max - z_min) / z_step).round() as usize + 1;
        let z = (0..n_z).map(|i| z_min + i as f64 * z_step).collect();
        Self::new(log10m, z)
    }

    pub fn log10m(&self) -> &[f64] {
        &self.log10m
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    /// (number of z rows, number of mass columns) of surfaces on this grid.
    pub fn shape(&self) -> (usize, usize) {
        (self.z.len(), self.log10m.len())
    }

    /// Index of the grid redshift closest to `z`.
    pub fn nearest_z(&self, z: f64) -> usize {
        nearest_index(&self.z, z)
    }

    /// Index of the grid log-mass closest to `log10m`.
    pub fn nearest_log10m(&self, log10m: f64) -> usize {
        nearest_index(&self.log10m, log10m)
    }
}

fn nearest_index(values: &[f64], target: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, v) in values.iter().enumerate() {
        let d = (v - target).abs();
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn from_ranges_endpoints() {
        let grid = MzGrid::from_ranges(13.0, 16.0, 301, 0.0, 2.0, 0.01).unwrap();
        assert_eq!(grid.shape(), (201, 301));
        assert_relative_eq!(grid.log10m()[0], 13.0);
        assert_relative_eq!(grid.log10m()[300], 16.0, epsilon = 1e-9);
        assert_relative_eq!(grid.z()[0], 0.0);
        assert_relative_eq!(grid.z()[200], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn nearest_lookup() {
        let grid = MzGrid::from_ranges(13.0, 16.0, 4, 0.0, 1.0, 0.5).unwrap();
        assert_eq!(grid.nearest_z(0.4), 1);
        assert_eq!(grid.nearest_z(-1.0), 0);
        assert_eq!(grid.nearest_z(9.0), 2);
        assert_eq!(grid.nearest_log10m(14.1), 1);
    }

    #[test]
    fn rejects_descending_axis() {
        assert!(matches!(
            MzGrid::new(vec![14.0, 13.0], vec![0.0, 1.0]),
            Err(GridError::NotAscending { axis: "log10m", .. })
        ));
        assert!(matches!(
            MzGrid::new(vec![13.0, 14.0], vec![0.5]),
            Err(GridError::TooFewPoints { axis: "z", .. })
        ));
    }
}
