//! Survey-wide selection-function state.
//!
//! [`SelectionFunctionStore`] owns one record per tile and is the only
//! place completeness state mutates: [`SelectionFunctionStore::update`]
//! rebuilds everything for a new parameter set, and every derived surface
//! read out afterwards belongs to that parameter set. There is no partial
//! or incremental update.

use crate::completeness::{calc_completeness, CompletenessError, CompletenessMethod};
use crate::cosmology::CosmologyParams;
use crate::filter_response::FilterResponse;
use crate::grid::MzGrid;
use crate::noise::{NoiseTable, NoiseTableError};
use crate::raster::{SkyBounds, TileGeometry};
use crate::scaling::ScalingRelation;
use crate::survey_model::{SurveyModel, SurveyModelError};
use ndarray::Array2;
use std::cell::OnceCell;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate tile name '{0}'")]
    DuplicateTile(String),

    #[error("no tiles with nonzero area")]
    NoTiles,

    #[error("catalog entry references unknown tile '{0}'")]
    UnknownTile(String),

    #[error("observed signal must be positive, got {y0} (tile '{tile}')")]
    NonPositiveSignal { tile: String, y0: f64 },

    #[error("store has not been updated yet; call update() first")]
    NotUpdated,

    #[error(transparent)]
    Model(#[from] SurveyModelError),

    #[error(transparent)]
    Completeness(#[from] CompletenessError),

    #[error(transparent)]
    Noise(#[from] NoiseTableError),
}

/// One catalog detection to be projected onto the (M, z) grid.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Tile the detection came from (selects the filter response).
    pub tile: String,
    /// Observed central Comptonization signal.
    pub y0: f64,
    /// Measurement error on the signal.
    pub y0_err: f64,
    /// Redshift.
    pub z: f64,
    /// Redshift error; zero means spectroscopic (no marginalization).
    pub z_err: f64,
}

/// Per-tile state owned by the store.
#[derive(Debug, Clone)]
pub struct TileRecord {
    pub name: String,
    pub noise_table: NoiseTable,
    pub area_deg2: f64,
    pub filter_response: FilterResponse,
    pub geometry: Option<TileGeometry>,
}

impl TileRecord {
    /// Record with its area taken from the noise table.
    pub fn new(
        name: impl Into<String>,
        noise_table: NoiseTable,
        filter_response: FilterResponse,
        geometry: Option<TileGeometry>,
    ) -> Self {
        let area_deg2 = noise_table.total_area_deg2();
        Self {
            name: name.into(),
            noise_table,
            area_deg2,
            filter_response,
            geometry,
        }
    }
}

/// Knobs fixed at store construction.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Noise-resolution bin width applied to every tile table at load;
    /// None keeps full resolution.
    pub downsample_step: Option<f64>,
    /// Weight catalog posteriors by the mass-function shape (corrects the
    /// Eddington-type bias from its steepness).
    pub mass_function_debias: bool,
    /// Observing frequency for the relativistic correction, in GHz.
    pub obs_freq_ghz: f64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            downsample_step: Some(1e-7),
            mass_function_debias: true,
            obs_freq_ghz: 148.0,
        }
    }
}

/// Owner of all tiles and the survey-average completeness state.
#[derive(Debug)]
pub struct SelectionFunctionStore {
    tiles: Vec<TileRecord>,
    snr_cut: f64,
    scaling: ScalingRelation,
    grid: MzGrid,
    options: StoreOptions,
    total_area_deg2: f64,
    model: Option<SurveyModel>,
    tile_surfaces: Vec<Array2<f64>>,
    survey_average: Option<Array2<f64>>,
    bounds_index: OnceCell<Vec<(usize, SkyBounds)>>,
}

impl SelectionFunctionStore {
    /// Build the store from tile records.
    ///
    /// Tile names must be unique. Tiles with zero area (e.g. no footprint
    /// overlap) are dropped with a diagnostic. Noise tables are
    /// down-binned here if the options ask for it.
    pub fn new(
        tiles: Vec<TileRecord>,
        snr_cut: f64,
        scaling: ScalingRelation,
        grid: MzGrid,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let mut seen = BTreeSet::new();
        for tile in &tiles {
            if !seen.insert(tile.name.clone()) {
                return Err(StoreError::DuplicateTile(tile.name.clone()));
            }
        }

        let mut kept = Vec::with_capacity(tiles.len());
        for mut tile in tiles {
            if tile.area_deg2 <= 0.0 {
                warn!(tile = %tile.name, "dropping tile with zero survey area");
                continue;
            }
            if let Some(step) = options.downsample_step {
                tile.noise_table = tile.noise_table.downsample(step)?;
            }
            kept.push(tile);
        }
        if kept.is_empty() {
            return Err(StoreError::NoTiles);
        }

        let total_area_deg2 = kept.iter().map(|t| t.area_deg2).sum();
        Ok(Self {
            tiles: kept,
            snr_cut,
            scaling,
            grid,
            options,
            total_area_deg2,
            model: None,
            tile_surfaces: Vec::new(),
            survey_average: None,
            bounds_index: OnceCell::new(),
        })
    }

    pub fn tiles(&self) -> &[TileRecord] {
        &self.tiles
    }

    pub fn total_area_deg2(&self) -> f64 {
        self.total_area_deg2
    }

    pub fn grid(&self) -> &MzGrid {
        &self.grid
    }

    pub fn scaling(&self) -> &ScalingRelation {
        &self.scaling
    }

    /// Area fraction per tile; sums to 1 over the kept tiles.
    pub fn area_weights(&self) -> Vec<f64> {
        self.tiles
            .iter()
            .map(|t| t.area_deg2 / self.total_area_deg2)
            .collect()
    }

    /// Recompute everything for a new parameter set.
    ///
    /// `mass_function` supplies the cluster-count grid for the new
    /// cosmology (the external halo-model collaborator). This is the only
    /// mutating entry point: per-tile surfaces and the survey average are
    /// rebuilt from scratch and any previously read surfaces are stale.
    pub fn update<F>(
        &mut self,
        cosmo: CosmologyParams,
        scaling: Option<ScalingRelation>,
        mass_function: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(&CosmologyParams, &MzGrid) -> Array2<f64>,
    {
        if let Some(s) = scaling {
            self.scaling = s;
        }
        let counts = mass_function(&cosmo, &self.grid);
        let model = SurveyModel::new(
            cosmo,
            self.grid.clone(),
            self.total_area_deg2,
            counts,
            self.options.obs_freq_ghz,
        )?;

        let mut surfaces = Vec::with_capacity(self.tiles.len());
        for tile in &self.tiles {
            let surface = calc_completeness(
                &tile.noise_table,
                self.snr_cut,
                &model,
                &self.scaling,
                &tile.filter_response,
                None,
                CompletenessMethod::Fast,
                None,
            )?;
            surfaces.push(surface);
        }

        let mut average = Array2::<f64>::zeros(self.grid.shape());
        for (tile, surface) in self.tiles.iter().zip(&surfaces) {
            let weight = tile.area_deg2 / self.total_area_deg2;
            average.scaled_add(weight, surface);
        }

        info!(
            tiles = self.tiles.len(),
            area_deg2 = self.total_area_deg2,
            "selection function updated"
        );
        self.model = Some(model);
        self.tile_surfaces = surfaces;
        self.survey_average = Some(average);
        Ok(())
    }

    /// Survey-average completeness surface from the last update.
    pub fn survey_average(&self) -> Result<&Array2<f64>, StoreError> {
        self.survey_average.as_ref().ok_or(StoreError::NotUpdated)
    }

    /// Per-tile surfaces from the last update, in tile order.
    pub fn tile_surfaces(&self) -> Result<&[Array2<f64>], StoreError> {
        if self.tile_surfaces.is_empty() {
            return Err(StoreError::NotUpdated);
        }
        Ok(&self.tile_surfaces)
    }

    /// Project catalog detections onto the (log₁₀ M, z) grid.
    ///
    /// Each entry contributes its posterior density P(log₁₀ M, z | y₀,
    /// z_obs), built by inverting the same signal model the completeness
    /// calculation uses, normalized to unit sum, then stacked over the
    /// catalog. The result sums to the number of entries.
    pub fn project_catalog_to_mz(
        &self,
        catalog: &[CatalogEntry],
    ) -> Result<Array2<f64>, StoreError> {
        let model = self.model.as_ref().ok_or(StoreError::NotUpdated)?;
        let (nz, nm) = self.grid.shape();
        let mut stacked = Array2::<f64>::zeros((nz, nm));

        for entry in catalog {
            if entry.y0 <= 0.0 {
                return Err(StoreError::NonPositiveSignal {
                    tile: entry.tile.clone(),
                    y0: entry.y0,
                });
            }
            let tile = self
                .tiles
                .iter()
                .find(|t| t.name == entry.tile)
                .ok_or_else(|| StoreError::UnknownTile(entry.tile.clone()))?;

            // Redshift weights: Gaussian for photometric errors, a delta
            // otherwise
            let pz: Vec<f64> = if entry.z_err > 0.0 {
                let raw: Vec<f64> = self
                    .grid
                    .z()
                    .iter()
                    .map(|&zk| {
                        (-(entry.z - zk).powi(2) / (2.0 * entry.z_err.powi(2))).exp()
                    })
                    .collect();
                let sum: f64 = raw.iter().sum();
                raw.iter().map(|v| v / sum).collect()
            } else {
                let mut delta = vec![0.0; nz];
                delta[self.grid.nearest_z(entry.z)] = 1.0;
                delta
            };

            let log_y0 = entry.y0.ln();
            let log_y0_err = (entry.y0 + entry.y0_err).ln() - log_y0;
            let var = log_y0_err.powi(2) + self.scaling.intrinsic_scatter.powi(2);

            let mut density = Array2::<f64>::zeros((nz, nm));
            for (k, &pzk) in pz.iter().enumerate() {
                if pzk <= 0.0 {
                    continue;
                }
                let debias = if self.options.mass_function_debias {
                    Some(model.p_log10m(k))
                } else {
                    None
                };
                for j in 0..nm {
                    let y0_pred =
                        model.predict_y0(&self.scaling, &tile.filter_response, k, j);
                    if y0_pred <= 0.0 {
                        continue;
                    }
                    let lnprob = -(log_y0 - y0_pred.ln()).powi(2) / (2.0 * var);
                    let mut p = lnprob.exp() * pzk;
                    if let Some(ref shape) = debias {
                        p *= shape[j];
                    }
                    density[[k, j]] = p;
                }
            }

            // NaNs from pathological cells are dropped rather than allowed
            // to poison the stack
            let mut nan_cells = 0usize;
            density.mapv_inplace(|v| {
                if v.is_nan() {
                    nan_cells += 1;
                    0.0
                } else {
                    v
                }
            });
            if nan_cells > 0 {
                warn!(tile = %entry.tile, nan_cells, "zeroed NaN posterior cells");
            }

            let total = density.sum();
            if total > 0.0 {
                stacked.scaled_add(1.0 / total, &density);
            } else {
                warn!(tile = %entry.tile, y0 = entry.y0, z = entry.z,
                      "catalog entry has empty posterior, skipping");
            }
        }
        Ok(stacked)
    }

    /// Test coordinates against the per-tile area masks.
    ///
    /// The bounding-box index is built on first use. Tiles without
    /// geometry never match.
    pub fn check_coords_in_area_mask(&self, coords: &[(f64, f64)]) -> Vec<bool> {
        let index = self.bounds_index.get_or_init(|| {
            self.tiles
                .iter()
                .enumerate()
                .filter_map(|(i, t)| t.geometry.as_ref().map(|g| (i, g.bounds())))
                .collect()
        });
        coords
            .iter()
            .map(|&(ra, dec)| {
                index.iter().any(|&(i, bounds)| {
                    bounds.contains(ra, dec)
                        && self.tiles[i]
                            .geometry
                            .as_ref()
                            .is_some_and(|g| g.contains(ra, dec))
                })
            })
            .collect()
    }

    /// Single-point convenience wrapper over
    /// [`Self::check_coords_in_area_mask`].
    pub fn check_coord_in_area_mask(&self, ra_deg: f64, dec_deg: f64) -> bool {
        self.check_coords_in_area_mask(&[(ra_deg, dec_deg)])[0]
    }
}
