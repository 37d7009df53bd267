//! Cluster-survey selection function modelling
//!
//! This crate computes the probability that a galaxy cluster of a given
//! true mass and redshift is detected by a matched-filter survey, from
//! per-tile noise maps and filter responses through to survey-average
//! completeness surfaces, completeness-based mass limits, and catalog
//! posterior projection onto the mass-redshift grid.

pub mod algo;
pub mod cache;
pub mod completeness;
pub mod cosmology;
pub mod filter_response;
pub mod footprint;
pub mod grid;
pub mod massconv;
pub mod noise;
pub mod raster;
pub mod scaling;
pub mod store;
pub mod survey_model;

// Re-exports for easier access
pub use cache::ArtifactCache;
pub use completeness::{
    calc_completeness, calc_mass_limit, mass_limit_per_noise_level, CompletenessMethod,
};
pub use cosmology::CosmologyParams;
pub use filter_response::{FilterResponse, FilterResponseTable};
pub use footprint::{completeness_by_footprint, FootprintCollection, FootprintTile};
pub use grid::MzGrid;
pub use massconv::MassConverter;
pub use noise::{NoiseBin, NoiseTable};
pub use raster::{SkyBounds, TileGeometry, TileRasters};
pub use scaling::ScalingRelation;
pub use store::{CatalogEntry, SelectionFunctionStore, StoreOptions, TileRecord};
pub use survey_model::SurveyModel;
