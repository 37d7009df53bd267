//! Footprint groupings and per-footprint summaries.
//!
//! A footprint is a named sub-region of the survey (an overlap with an
//! external survey, a deep field) described as a set of tile fragments
//! with the area each tile contributes. Selection surfaces restricted to
//! a footprint are the area-weighted average of the member surfaces.

use crate::completeness::{calc_mass_limit, CompletenessError};
use crate::grid::MzGrid;
use ndarray::Array2;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Label naming the whole survey in a [`FootprintCollection`].
pub const FULL_SURVEY: &str = "full";

#[derive(Debug, Error)]
pub enum FootprintError {
    #[error("no footprint named '{0}'")]
    UnknownLabel(String),

    #[error(transparent)]
    Completeness(#[from] CompletenessError),
}

/// One tile's contribution to a footprint.
#[derive(Debug, Clone)]
pub struct FootprintTile {
    pub tile_name: String,
    /// Area of the tile that falls inside the footprint, deg².
    pub area_deg2: f64,
    /// Completeness surface of the tile, (z, log₁₀ M).
    pub surface: Array2<f64>,
}

/// Named footprints, each a set of tile fragments.
#[derive(Debug, Default)]
pub struct FootprintCollection {
    footprints: BTreeMap<String, Vec<FootprintTile>>,
}

impl FootprintCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a footprint, replacing any existing one with the label.
    pub fn insert(&mut self, label: impl Into<String>, tiles: Vec<FootprintTile>) {
        self.footprints.insert(label.into(), tiles);
    }

    pub fn get(&self, label: &str) -> Option<&[FootprintTile]> {
        self.footprints.get(label).map(Vec::as_slice)
    }

    /// Like [`Self::get`] but an unknown label is an error, for callers
    /// resolving user configuration.
    pub fn require(&self, label: &str) -> Result<&[FootprintTile], FootprintError> {
        self.get(label)
            .ok_or_else(|| FootprintError::UnknownLabel(label.to_string()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.footprints.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }
}

/// Per-footprint completeness summary.
#[derive(Debug, Clone)]
pub struct FootprintSummary {
    pub label: String,
    /// Area-weighted average completeness surface over the member tiles.
    pub surface: Array2<f64>,
    /// 90 per cent completeness mass limit per redshift bin, 10¹⁴ M☉.
    pub mass_limit: Vec<f64>,
    /// Mean of the limit over bin centres in 0.2 ≤ z < 1.0.
    pub mean_limit: f64,
}

/// Summarize every footprint in the collection.
///
/// Zero-area member tiles are skipped with a diagnostic; a footprint
/// whose tiles all have zero area is skipped entirely and omitted from
/// the output. Mass limits are computed per member tile and averaged
/// with the same area weights as the surface, ignoring bins where a
/// member has no defined limit.
pub fn completeness_by_footprint(
    collection: &FootprintCollection,
    grid: &MzGrid,
    z_bin_edges: Option<&[f64]>,
) -> Result<Vec<FootprintSummary>, FootprintError> {
    let mut summaries = Vec::with_capacity(collection.len());
    for label in collection.labels() {
        let tiles = collection.require(label)?;
        if let Some(summary) = summarize(label, tiles, grid, z_bin_edges)? {
            summaries.push(summary);
        }
    }
    Ok(summaries)
}

fn summarize(
    label: &str,
    tiles: &[FootprintTile],
    grid: &MzGrid,
    z_bin_edges: Option<&[f64]>,
) -> Result<Option<FootprintSummary>, FootprintError> {
    let members: Vec<&FootprintTile> = tiles
        .iter()
        .filter(|t| {
            if t.area_deg2 <= 0.0 {
                warn!(footprint = label, tile = %t.tile_name,
                      "tile contributes zero area, skipping");
                false
            } else {
                true
            }
        })
        .collect();
    if members.is_empty() {
        warn!(footprint = label, "no survey overlap, omitting from summaries");
        return Ok(None);
    }

    let total_area: f64 = members.iter().map(|t| t.area_deg2).sum();
    let mut surface = Array2::<f64>::zeros(grid.shape());
    for tile in &members {
        surface.scaled_add(tile.area_deg2 / total_area, &tile.surface);
    }

    let n_bins = z_bin_edges.map_or(grid.shape().0, |edges| edges.len() - 1);
    let mut limit_sum = vec![0.0; n_bins];
    let mut weight_sum = vec![0.0; n_bins];
    for tile in &members {
        let limits = calc_mass_limit(0.9, &tile.surface, grid, z_bin_edges)?;
        let weight = tile.area_deg2 / total_area;
        for (i, &limit) in limits.iter().enumerate() {
            if limit.is_finite() {
                limit_sum[i] += weight * limit;
                weight_sum[i] += weight;
            }
        }
    }
    let mass_limit: Vec<f64> = limit_sum
        .iter()
        .zip(&weight_sum)
        .map(|(&s, &w)| if w > 0.0 { s / w } else { f64::NAN })
        .collect();

    let centres: Vec<f64> = match z_bin_edges {
        Some(edges) => edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect(),
        None => grid.z().to_vec(),
    };
    let selected: Vec<f64> = centres
        .iter()
        .zip(&mass_limit)
        .filter(|&(&z, &m)| (0.2..1.0).contains(&z) && m.is_finite())
        .map(|(_, &m)| m)
        .collect();
    let mean_limit = if selected.is_empty() {
        f64::NAN
    } else {
        selected.iter().sum::<f64>() / selected.len() as f64
    };

    Ok(Some(FootprintSummary {
        label: label.to_string(),
        surface,
        mass_limit,
        mean_limit,
    }))
}
