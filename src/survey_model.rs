//! Cosmology-dependent survey model over the shared grid.
//!
//! Precomputes, for one parameter set, every per-grid-point quantity the
//! completeness calculation needs: E(z) per redshift slice, the cluster
//! angular scale θ₅₀₀ and the relativistic correction per (z, mass) cell,
//! and the externally supplied cluster-count grid from the halo mass
//! function. Rebuilt from scratch whenever the cosmology changes; nothing
//! here is mutated in place.

use crate::cosmology::CosmologyParams;
use crate::filter_response::FilterResponse;
use crate::grid::MzGrid;
use crate::scaling::{f_rel, ScalingRelation};
use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurveyModelError {
    #[error("cluster-count grid shape {found:?} does not match grid shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("total survey area must be positive, got {0}")]
    NonPositiveArea(f64),
}

/// One mock draw from the survey: a true (mass, z) cell and the signal it
/// would be measured with under a given noise level.
#[derive(Debug, Clone, Copy)]
pub struct MockDraw {
    /// Redshift row index on the grid.
    pub z_index: usize,
    /// Log-mass column index on the grid.
    pub m_index: usize,
    /// Mean relation signal at the cell.
    pub y0_true: f64,
    /// Signal after intrinsic scatter and measurement noise.
    pub y0_measured: f64,
}

/// Per-parameter-set precomputed quantities over an [`MzGrid`].
#[derive(Debug, Clone)]
pub struct SurveyModel {
    cosmo: CosmologyParams,
    grid: MzGrid,
    total_area_deg2: f64,
    /// E(z) per redshift row.
    ez: Vec<f64>,
    /// θ₅₀₀ in arcmin per (z, mass) cell.
    theta500: Array2<f64>,
    /// Relativistic correction per (z, mass) cell.
    f_rel: Array2<f64>,
    /// Expected cluster counts per cell, from the external mass-function
    /// model.
    cluster_count: Array2<f64>,
}

impl SurveyModel {
    /// Build the model for one cosmology.
    ///
    /// `cluster_count` comes from the external halo mass-function model
    /// evaluated on `grid`; its shape must match. `obs_freq_ghz` sets the
    /// frequency of the relativistic correction.
    pub fn new(
        cosmo: CosmologyParams,
        grid: MzGrid,
        total_area_deg2: f64,
        cluster_count: Array2<f64>,
        obs_freq_ghz: f64,
    ) -> Result<Self, SurveyModelError> {
        if total_area_deg2 <= 0.0 {
            return Err(SurveyModelError::NonPositiveArea(total_area_deg2));
        }
        let (nz, nm) = grid.shape();
        if cluster_count.dim() != (nz, nm) {
            return Err(SurveyModelError::ShapeMismatch {
                expected: (nz, nm),
                found: cluster_count.dim(),
            });
        }

        let ez: Vec<f64> = grid.z().iter().map(|&z| cosmo.ez(z)).collect();

        let mut theta500 = Array2::<f64>::zeros((nz, nm));
        let mut f_rel_grid = Array2::<f64>::zeros((nz, nm));
        for (k, &z) in grid.z().iter().enumerate() {
            for (j, &lm) in grid.log10m().iter().enumerate() {
                let m500 = 10f64.powf(lm);
                theta500[[k, j]] = cosmo.theta500_arcmin(m500, z);
                f_rel_grid[[k, j]] = f_rel(&cosmo, z, m500, obs_freq_ghz);
            }
        }

        Ok(Self {
            cosmo,
            grid,
            total_area_deg2,
            ez,
            theta500,
            f_rel: f_rel_grid,
            cluster_count,
        })
    }

    /// A flat cluster-count grid, for tests and for runs where only the
    /// completeness surface (not number counts) is needed.
    pub fn uniform_counts(grid: &MzGrid) -> Array2<f64> {
        Array2::ones(grid.shape())
    }

    pub fn cosmology(&self) -> &CosmologyParams {
        &self.cosmo
    }

    pub fn grid(&self) -> &MzGrid {
        &self.grid
    }

    pub fn total_area_deg2(&self) -> f64 {
        self.total_area_deg2
    }

    /// E(z) at redshift row `k`.
    pub fn ez(&self, k: usize) -> f64 {
        self.ez[k]
    }

    /// θ₅₀₀ in arcmin at cell (k, j).
    pub fn theta500(&self, k: usize, j: usize) -> f64 {
        self.theta500[[k, j]]
    }

    /// Relativistic correction at cell (k, j).
    pub fn f_rel(&self, k: usize, j: usize) -> f64 {
        self.f_rel[[k, j]]
    }

    pub fn cluster_count(&self) -> &Array2<f64> {
        &self.cluster_count
    }

    /// Normalized mass-function slice P(log₁₀ M) at redshift row `k`
    /// (unit integral over the log-mass axis).
    pub fn p_log10m(&self, k: usize) -> Vec<f64> {
        let row: Vec<f64> = self.cluster_count.row(k).to_vec();
        let norm = trapezoid(&row, self.grid.log10m());
        if norm > 0.0 {
            row.iter().map(|v| v / norm).collect()
        } else {
            row
        }
    }

    /// Mean relation signal at cell (k, j) for the given scaling relation
    /// and filter response.
    pub fn predict_y0(
        &self,
        scaling: &ScalingRelation,
        filter: &FilterResponse,
        k: usize,
        j: usize,
    ) -> f64 {
        let m500 = 10f64.powf(self.grid.log10m()[j]);
        let q = filter.at(self.theta500[[k, j]]);
        scaling.predict_y0(self.ez[k], m500, q, self.f_rel[[k, j]])
    }

    /// Draw `n_draws` mock clusters with (mass, z) cells sampled
    /// proportionally to the cluster-count grid, then apply log-normal
    /// intrinsic scatter and Gaussian measurement noise at `y0_noise`.
    ///
    /// `z_index` restricts the draws to a single redshift row.
    pub fn draw_sample<R: Rng>(
        &self,
        rng: &mut R,
        scaling: &ScalingRelation,
        filter: &FilterResponse,
        y0_noise: f64,
        n_draws: usize,
        z_index: Option<usize>,
    ) -> Vec<MockDraw> {
        let (nz, nm) = self.grid.shape();
        let rows: Vec<usize> = match z_index {
            Some(k) => vec![k],
            None => (0..nz).collect(),
        };

        // Cumulative weights over the selected cells
        let mut cumulative = Vec::with_capacity(rows.len() * nm);
        let mut total = 0.0;
        for &k in &rows {
            for j in 0..nm {
                total += self.cluster_count[[k, j]];
                cumulative.push(total);
            }
        }

        let scatter = Normal::new(0.0, scaling.intrinsic_scatter.max(f64::MIN_POSITIVE))
            .expect("scatter is finite and non-negative");
        let noise = Normal::new(0.0, y0_noise).expect("noise level is finite");

        let mut draws = Vec::with_capacity(n_draws);
        for _ in 0..n_draws {
            let u: f64 = rng.gen::<f64>() * total;
            let flat = cumulative.partition_point(|&c| c < u).min(cumulative.len() - 1);
            let k = rows[flat / nm];
            let j = flat % nm;

            let y0_true = self.predict_y0(scaling, filter, k, j).max(1e-12);
            let y0_scattered = (y0_true.ln() + scatter.sample(rng)).exp();
            let y0_measured = y0_scattered + noise.sample(rng);
            draws.push(MockDraw {
                z_index: k,
                m_index: j,
                y0_true,
                y0_measured,
            });
        }
        draws
    }
}

fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    let mut sum = 0.0;
    for i in 1..y.len() {
        sum += 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_model() -> SurveyModel {
        let grid = MzGrid::from_ranges(13.5, 15.5, 21, 0.1, 1.1, 0.1).unwrap();
        let counts = SurveyModel::uniform_counts(&grid);
        SurveyModel::new(CosmologyParams::default(), grid, 100.0, counts, 148.0).unwrap()
    }

    #[test]
    fn rejects_mismatched_counts() {
        let grid = MzGrid::from_ranges(13.5, 15.5, 21, 0.1, 1.1, 0.1).unwrap();
        let counts = Array2::ones((3, 3));
        assert!(matches!(
            SurveyModel::new(CosmologyParams::default(), grid, 100.0, counts, 148.0),
            Err(SurveyModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn theta500_grows_with_mass() {
        let model = small_model();
        let (nz, nm) = model.grid().shape();
        for k in 0..nz {
            for j in 1..nm {
                assert!(model.theta500(k, j) > model.theta500(k, j - 1));
            }
        }
    }

    #[test]
    fn p_log10m_unit_integral() {
        let model = small_model();
        let p = model.p_log10m(3);
        let mut sum = 0.0;
        let lm = model.grid().log10m();
        for i in 1..p.len() {
            sum += 0.5 * (p[i] + p[i - 1]) * (lm[i] - lm[i - 1]);
        }
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn draws_cover_grid_and_scatter() {
        let model = small_model();
        let scaling = ScalingRelation::upp_default();
        let filter = FilterResponse::unity();
        let mut rng = StdRng::seed_from_u64(7);
        let draws = model.draw_sample(&mut rng, &scaling, &filter, 2e-5, 5000, None);
        assert_eq!(draws.len(), 5000);
        let (nz, nm) = model.grid().shape();
        let mut seen = vec![false; nz];
        for d in &draws {
            assert!(d.z_index < nz && d.m_index < nm);
            assert!(d.y0_true > 0.0);
            seen[d.z_index] = true;
        }
        // Uniform counts should touch every redshift row with 5000 draws
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn single_z_draws_stay_in_row() {
        let model = small_model();
        let scaling = ScalingRelation::upp_default();
        let filter = FilterResponse::unity();
        let mut rng = StdRng::seed_from_u64(11);
        let draws = model.draw_sample(&mut rng, &scaling, &filter, 2e-5, 200, Some(4));
        assert!(draws.iter().all(|d| d.z_index == 4));
    }
}
