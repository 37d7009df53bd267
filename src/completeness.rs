//! Completeness surfaces and mass limits.
//!
//! The completeness of a tile is the probability that a cluster of true
//! mass M at redshift z is detected above the survey signal-to-noise cut,
//! marginalized over the tile's noise distribution and the intrinsic
//! scatter of the scaling relation. The analytic path evaluates this
//! directly on the (z, log₁₀ M) grid; the Monte Carlo path estimates the
//! same surface from mock draws and exists to cross-check the analytic
//! result.

use crate::algo::stats::normal_sf;
use crate::filter_response::FilterResponse;
use crate::grid::MzGrid;
use crate::noise::NoiseTable;
use crate::scaling::ScalingRelation;
use crate::survey_model::SurveyModel;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::debug;

/// Floor applied to non-positive predicted signals. A numerical guard for
/// extreme cosmologies where the filter-response fit goes negative, not a
/// physical state.
const Y0_FLOOR: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum CompletenessError {
    #[error("signal-to-noise cut must be positive, got {0}")]
    NonPositiveSnrCut(f64),

    #[error("Monte Carlo method needs num_draws > 0 and num_iterations > 0")]
    EmptyMonteCarlo,

    #[error("surface shape {surface:?} does not match grid shape {grid:?}")]
    ShapeMismatch {
        surface: (usize, usize),
        grid: (usize, usize),
    },
}

/// How to evaluate the completeness surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletenessMethod {
    /// Analytic marginalization over the noise table (the production path).
    Fast,
    /// Mock-draw estimate, for verifying the analytic path.
    MonteCarlo {
        num_draws: usize,
        num_iterations: usize,
    },
}

/// Compute the completeness surface for one tile.
///
/// Output is a (z, log₁₀ M) array on the model's grid with values in
/// [0, 1]. With `single_z` set, only the nearest grid redshift row is
/// populated and all other rows are zero. `seed` fixes the Monte Carlo
/// random stream; it is ignored by the analytic path.
pub fn calc_completeness(
    noise: &NoiseTable,
    snr_cut: f64,
    model: &SurveyModel,
    scaling: &ScalingRelation,
    filter: &FilterResponse,
    single_z: Option<f64>,
    method: CompletenessMethod,
    seed: Option<u64>,
) -> Result<Array2<f64>, CompletenessError> {
    if snr_cut <= 0.0 {
        return Err(CompletenessError::NonPositiveSnrCut(snr_cut));
    }
    let z_rows: Vec<usize> = match single_z {
        Some(z) => vec![model.grid().nearest_z(z)],
        None => (0..model.grid().shape().0).collect(),
    };

    match method {
        CompletenessMethod::Fast => {
            Ok(fast_completeness(noise, snr_cut, model, scaling, filter, &z_rows))
        }
        CompletenessMethod::MonteCarlo {
            num_draws,
            num_iterations,
        } => {
            if num_draws == 0 || num_iterations == 0 {
                return Err(CompletenessError::EmptyMonteCarlo);
            }
            Ok(monte_carlo_completeness(
                noise,
                snr_cut,
                model,
                scaling,
                filter,
                &z_rows,
                num_draws,
                num_iterations,
                seed,
            ))
        }
    }
}

fn fast_completeness(
    noise: &NoiseTable,
    snr_cut: f64,
    model: &SurveyModel,
    scaling: &ScalingRelation,
    filter: &FilterResponse,
    z_rows: &[usize],
) -> Array2<f64> {
    let (nz, nm) = model.grid().shape();

    // True signal per selected grid cell, floored where the prediction
    // goes non-positive
    let mut y0_grid = Array2::<f64>::zeros((nz, nm));
    let mut floored = 0usize;
    for &k in z_rows {
        for j in 0..nm {
            let y0 = model.predict_y0(scaling, filter, k, j);
            y0_grid[[k, j]] = if y0 > 0.0 {
                y0
            } else {
                floored += 1;
                Y0_FLOOR
            };
        }
    }
    if floored > 0 {
        debug!(floored, "non-positive predicted signals floored");
    }

    let weights = noise.area_weights();
    let mut comp = Array2::<f64>::zeros((nz, nm));
    for (bin, weight) in noise.bins().iter().zip(weights) {
        let log_threshold = (snr_cut * bin.y0_rms).ln();
        for &k in z_rows {
            for j in 0..nm {
                let y0 = y0_grid[[k, j]];
                let snr = y0 / bin.y0_rms;
                // Below the cut the error budget is set by the cut itself
                let log_err = if snr < snr_cut { 1.0 / snr_cut } else { 1.0 / snr };
                let total_err =
                    (log_err * log_err + scaling.intrinsic_scatter.powi(2)).sqrt();
                comp[[k, j]] += weight * normal_sf(log_threshold, y0.ln(), total_err);
            }
        }
    }
    // Guard against float accumulation nudging past the bounds
    comp.mapv_inplace(|v| v.clamp(0.0, 1.0));
    comp
}

#[allow(clippy::too_many_arguments)]
fn monte_carlo_completeness(
    noise: &NoiseTable,
    snr_cut: f64,
    model: &SurveyModel,
    scaling: &ScalingRelation,
    filter: &FilterResponse,
    z_rows: &[usize],
    num_draws: usize,
    num_iterations: usize,
    seed: Option<u64>,
) -> Array2<f64> {
    let (nz, nm) = model.grid().shape();
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    // The mock draws use the tile's area-weighted mean noise level; the
    // cross-check therefore compares against the analytic surface for the
    // same single-level table.
    let y0_noise = noise.weighted_mean_rms();
    let threshold = snr_cut * y0_noise;
    let single_row = if z_rows.len() == 1 { Some(z_rows[0]) } else { None };

    let mut all = Array2::<f64>::zeros((nz, nm));
    let mut detected = Array2::<f64>::zeros((nz, nm));
    for _ in 0..num_iterations {
        let draws =
            model.draw_sample(&mut rng, scaling, filter, y0_noise, num_draws, single_row);
        for draw in draws {
            all[[draw.z_index, draw.m_index]] += 1.0;
            if draw.y0_measured > threshold {
                detected[[draw.z_index, draw.m_index]] += 1.0;
            }
        }
    }

    // Cells nothing was drawn into are reported complete; they only occur
    // where the cluster-count grid is empty
    let mut comp = Array2::ones((nz, nm));
    for ((k, j), &n) in all.indexed_iter() {
        if n > 0.0 {
            comp[[k, j]] = detected[[k, j]] / n;
        }
    }
    if single_row.is_some() || z_rows.len() < nz {
        // Match the analytic path: unselected rows are zero
        for k in 0..nz {
            if !z_rows.contains(&k) {
                for j in 0..nm {
                    comp[[k, j]] = 0.0;
                }
            }
        }
    }
    comp
}

/// Reduce a completeness surface to a mass limit per redshift.
///
/// For each z row, returns the grid mass (in units of 10¹⁴ MSun) whose
/// completeness is nearest `fraction`, not interpolated, so the limit is
/// always a grid value. With `z_bin_edges` the native curve
/// is re-binned by averaging over the rows falling in each half-open bin
/// (lo, hi]; a bin containing no rows yields NaN.
pub fn calc_mass_limit(
    fraction: f64,
    comp_mz: &Array2<f64>,
    grid: &MzGrid,
    z_bin_edges: Option<&[f64]>,
) -> Result<Vec<f64>, CompletenessError> {
    let (nz, nm) = grid.shape();
    if comp_mz.dim() != (nz, nm) {
        return Err(CompletenessError::ShapeMismatch {
            surface: comp_mz.dim(),
            grid: (nz, nm),
        });
    }

    let native: Vec<f64> = (0..nz)
        .map(|k| {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for j in 0..nm {
                let d = (comp_mz[[k, j]] - fraction).abs();
                if d < best_dist {
                    best_dist = d;
                    best = j;
                }
            }
            10f64.powf(grid.log10m()[best]) / 1e14
        })
        .collect();

    let Some(edges) = z_bin_edges else {
        return Ok(native);
    };

    let z = grid.z();
    let binned = edges
        .windows(2)
        .map(|edge| {
            let mut sum = 0.0;
            let mut count = 0usize;
            for (k, &zk) in z.iter().enumerate() {
                if zk > edge[0] && zk <= edge[1] {
                    sum += native[k];
                    count += 1;
                }
            }
            if count > 0 {
                sum / count as f64
            } else {
                f64::NAN
            }
        })
        .collect();
    Ok(binned)
}

/// Mass limit reached on each noise level of a tile, at a single redshift.
///
/// Evaluates the analytic completeness for each noise level in isolation
/// and extracts the mass at `fraction` completeness; the mapping from
/// noise level to limit is what gets painted back onto the noise raster
/// to make mass-limit maps.
pub fn mass_limit_per_noise_level(
    noise: &NoiseTable,
    snr_cut: f64,
    model: &SurveyModel,
    scaling: &ScalingRelation,
    filter: &FilterResponse,
    z: f64,
    fraction: f64,
) -> Result<Vec<(f64, f64)>, CompletenessError> {
    let k = model.grid().nearest_z(z);
    let mut out = Vec::with_capacity(noise.len());
    for bin in noise.bins() {
        let single = NoiseTable::from_bins(vec![*bin]).expect("single bin is non-empty");
        let comp = calc_completeness(
            &single,
            snr_cut,
            model,
            scaling,
            filter,
            Some(z),
            CompletenessMethod::Fast,
            None,
        )?;
        let limits = calc_mass_limit(fraction, &comp, model.grid(), None)?;
        out.push((bin.y0_rms, limits[k]));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmology::CosmologyParams;
    use crate::noise::NoiseBin;

    fn test_model() -> SurveyModel {
        let grid = MzGrid::from_ranges(13.5, 15.5, 41, 0.1, 1.1, 0.1).unwrap();
        let counts = SurveyModel::uniform_counts(&grid);
        SurveyModel::new(CosmologyParams::default(), grid, 400.0, counts, 148.0).unwrap()
    }

    fn single_level_table(rms: f64) -> NoiseTable {
        NoiseTable::from_bins(vec![NoiseBin {
            y0_rms: rms,
            area_deg2: 400.0,
        }])
        .unwrap()
    }

    #[test]
    fn completeness_bounded_and_monotone_in_mass() {
        let model = test_model();
        let noise = single_level_table(2e-5);
        let scaling = ScalingRelation::upp_default();
        let comp = calc_completeness(
            &noise,
            5.0,
            &model,
            &scaling,
            &FilterResponse::unity(),
            None,
            CompletenessMethod::Fast,
            None,
        )
        .unwrap();

        let (nz, nm) = model.grid().shape();
        for k in 0..nz {
            for j in 0..nm {
                let c = comp[[k, j]];
                assert!((0.0..=1.0).contains(&c), "comp[{k},{j}] = {c}");
                if j > 0 {
                    assert!(c >= comp[[k, j - 1]] - 1e-9);
                }
            }
        }
    }

    #[test]
    fn rejects_bad_snr_cut() {
        let model = test_model();
        let noise = single_level_table(2e-5);
        assert!(matches!(
            calc_completeness(
                &noise,
                0.0,
                &model,
                &ScalingRelation::upp_default(),
                &FilterResponse::unity(),
                None,
                CompletenessMethod::Fast,
                None,
            ),
            Err(CompletenessError::NonPositiveSnrCut(_))
        ));
    }

    #[test]
    fn single_z_populates_one_row() {
        let model = test_model();
        let noise = single_level_table(2e-5);
        let comp = calc_completeness(
            &noise,
            5.0,
            &model,
            &ScalingRelation::upp_default(),
            &FilterResponse::unity(),
            Some(0.52),
            CompletenessMethod::Fast,
            None,
        )
        .unwrap();
        let k = model.grid().nearest_z(0.52);
        let (nz, nm) = model.grid().shape();
        assert!(comp.row(k).iter().any(|&c| c > 0.0));
        for other in (0..nz).filter(|&r| r != k) {
            for j in 0..nm {
                assert_eq!(comp[[other, j]], 0.0);
            }
        }
    }

    #[test]
    fn mass_limit_is_a_grid_value() {
        let model = test_model();
        let noise = single_level_table(2e-5);
        let comp = calc_completeness(
            &noise,
            5.0,
            &model,
            &ScalingRelation::upp_default(),
            &FilterResponse::unity(),
            None,
            CompletenessMethod::Fast,
            None,
        )
        .unwrap();
        let limits = calc_mass_limit(0.9, &comp, model.grid(), None).unwrap();
        assert_eq!(limits.len(), model.grid().z().len());
        for limit in limits {
            let on_grid = model
                .grid()
                .log10m()
                .iter()
                .any(|&lm| ((10f64.powf(lm) / 1e14) - limit).abs() < 1e-9);
            assert!(on_grid, "limit {limit} not on the mass grid");
        }
    }

    #[test]
    fn mass_limit_empty_bin_is_nan() {
        let model = test_model();
        let comp = Array2::from_elem(model.grid().shape(), 0.9);
        // Grid spans z = 0.1..1.1: the last bin has no members
        let edges = [0.0, 0.6, 1.2, 5.0, 6.0];
        let binned = calc_mass_limit(0.9, &comp, model.grid(), Some(&edges)).unwrap();
        assert_eq!(binned.len(), 4);
        assert!(binned[0].is_finite());
        assert!(binned[1].is_finite());
        assert!(binned[2].is_nan());
        assert!(binned[3].is_nan());
    }

    #[test]
    fn mass_limit_shape_checked() {
        let model = test_model();
        let wrong = Array2::zeros((2, 2));
        assert!(matches!(
            calc_mass_limit(0.9, &wrong, model.grid(), None),
            Err(CompletenessError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn deeper_noise_levels_reach_lower_masses() {
        let model = test_model();
        let scaling = ScalingRelation::upp_default();
        let table = NoiseTable::from_bins(vec![
            NoiseBin {
                y0_rms: 1e-5,
                area_deg2: 10.0,
            },
            NoiseBin {
                y0_rms: 5e-5,
                area_deg2: 10.0,
            },
        ])
        .unwrap();
        let limits = mass_limit_per_noise_level(
            &table,
            5.0,
            &model,
            &scaling,
            &FilterResponse::unity(),
            0.5,
            0.9,
        )
        .unwrap();
        assert_eq!(limits.len(), 2);
        assert!(limits[0].1 < limits[1].1, "deep level should reach lower mass");
    }
}
