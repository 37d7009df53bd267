//! Per-tile noise summarization.
//!
//! A noise raster is compressed into a small table of (noise level, sky
//! area) rows: one row per distinct map RMS value, with the total valid
//! area that carries it. Matched-filter noise maps are block-constant, so
//! the distinct-value table is typically a few hundred rows for a tile of
//! millions of pixels. The table is the unit of caching and the input to
//! the completeness calculation.

use crate::algo::stats::weighted_mean;
use crate::raster::TileRasters;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NoiseTableError {
    #[error("footprint mask shape {found:?} does not match raster shape {expected:?}")]
    MaskShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("no valid pixels: every noise value is zero or masked")]
    Empty,

    #[error("downsample step must be positive, got {0}")]
    NonPositiveStep(f64),
}

/// One (noise level, area) row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseBin {
    /// Map noise level (y₀ RMS).
    pub y0_rms: f64,
    /// Sky area carrying this noise level, in deg².
    pub area_deg2: f64,
}

/// Ordered table of distinct noise levels and the area at each.
///
/// Invariants: rms values are unique, positive and ascending; the areas
/// sum to the tile's valid survey area (post mask/footprint intersection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseTable {
    bins: Vec<NoiseBin>,
}

impl NoiseTable {
    /// Summarize a tile's rasters, optionally intersected with a footprint
    /// mask (1 = inside footprint). Both the noise and area rasters are
    /// multiplied by the mask before enumeration.
    pub fn build(
        rasters: &TileRasters,
        footprint_mask: Option<&Array2<f64>>,
    ) -> Result<Self, NoiseTableError> {
        if let Some(mask) = footprint_mask {
            if mask.dim() != rasters.noise.dim() {
                return Err(NoiseTableError::MaskShapeMismatch {
                    expected: rasters.noise.dim(),
                    found: mask.dim(),
                });
            }
        }

        let area_deg2 = rasters.area_map_deg2();

        // Noise maps are block-constant, so grouping by exact bit pattern
        // is the float equivalent of grouping by value. Positive floats
        // order identically to their bit patterns.
        let mut by_level: BTreeMap<u64, f64> = BTreeMap::new();
        for ((idx, &rms), &a) in rasters.noise.indexed_iter().zip(area_deg2.iter()) {
            let masked = footprint_mask.map(|m| m[idx]).unwrap_or(1.0);
            if rms > 0.0 && masked > 0.0 {
                *by_level.entry(rms.to_bits()).or_insert(0.0) += a * masked;
            }
        }

        let bins: Vec<NoiseBin> = by_level
            .into_iter()
            .map(|(bits, area)| NoiseBin {
                y0_rms: f64::from_bits(bits),
                area_deg2: area,
            })
            .collect();
        if bins.is_empty() {
            return Err(NoiseTableError::Empty);
        }
        Ok(Self { bins })
    }

    /// Table from pre-built rows, e.g. a deserialized artifact. Rows are
    /// sorted by noise level.
    pub fn from_bins(mut bins: Vec<NoiseBin>) -> Result<Self, NoiseTableError> {
        if bins.is_empty() {
            return Err(NoiseTableError::Empty);
        }
        bins.sort_by(|a, b| a.y0_rms.total_cmp(&b.y0_rms));
        Ok(Self { bins })
    }

    pub fn bins(&self) -> &[NoiseBin] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Total valid sky area in deg².
    pub fn total_area_deg2(&self) -> f64 {
        self.bins.iter().map(|b| b.area_deg2).sum()
    }

    /// Area fraction per row; sums to 1.
    pub fn area_weights(&self) -> Vec<f64> {
        let total = self.total_area_deg2();
        self.bins.iter().map(|b| b.area_deg2 / total).collect()
    }

    /// Area-weighted mean noise level of the tile.
    pub fn weighted_mean_rms(&self) -> f64 {
        let levels: Vec<f64> = self.bins.iter().map(|b| b.y0_rms).collect();
        let areas: Vec<f64> = self.bins.iter().map(|b| b.area_deg2).collect();
        weighted_mean(&levels, &areas)
    }

    /// Bin the table to a coarser noise resolution.
    ///
    /// Levels are grouped into fixed-width bins of `step`; each non-empty
    /// bin reports the area-weighted mean level and the summed area. Empty
    /// bins are dropped. Total area is preserved.
    pub fn downsample(&self, step: f64) -> Result<Self, NoiseTableError> {
        if step <= 0.0 {
            return Err(NoiseTableError::NonPositiveStep(step));
        }
        let min = self.bins[0].y0_rms;
        let max = self.bins[self.bins.len() - 1].y0_rms;
        let n_bins = (((max - min) / step).floor() as usize) + 1;

        let mut level_sum = vec![0.0; n_bins];
        let mut area_sum = vec![0.0; n_bins];
        for bin in &self.bins {
            let i = (((bin.y0_rms - min) / step) as usize).min(n_bins - 1);
            level_sum[i] += bin.y0_rms * bin.area_deg2;
            area_sum[i] += bin.area_deg2;
        }

        let bins: Vec<NoiseBin> = level_sum
            .into_iter()
            .zip(area_sum)
            .filter(|&(_, a)| a > 0.0)
            .map(|(ls, a)| NoiseBin {
                y0_rms: ls / a,
                area_deg2: a,
            })
            .collect();
        // Non-empty input guarantees at least one populated bin
        Ok(Self { bins })
    }
}
