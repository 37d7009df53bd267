//! Tile raster contract.
//!
//! The crate does not read map files itself; the mapping stage hands over
//! per-tile rasters already intersected with the survey mask. This module
//! defines the shapes the core works against: the noise map, the valid-area
//! map, per-pixel solid angles, and enough sky geometry for point-in-survey
//! checks.

use ndarray::Array2;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("raster shapes differ: noise {noise:?}, area {area:?}, pixel area {pixel:?}")]
    ShapeMismatch {
        noise: (usize, usize),
        area: (usize, usize),
        pixel: (usize, usize),
    },
}

/// Per-tile input rasters, all on the same pixel grid.
#[derive(Debug, Clone)]
pub struct TileRasters {
    /// Map noise level (y₀ RMS) per pixel; zero marks invalid pixels.
    pub noise: Array2<f64>,
    /// Valid-area mask: 1 inside the surveyed region, 0 outside.
    pub area: Array2<f64>,
    /// Solid angle of each pixel in arcmin².
    pub pixel_area_arcmin2: Array2<f64>,
}

impl TileRasters {
    pub fn new(
        noise: Array2<f64>,
        area: Array2<f64>,
        pixel_area_arcmin2: Array2<f64>,
    ) -> Result<Self, RasterError> {
        if noise.dim() != area.dim() || noise.dim() != pixel_area_arcmin2.dim() {
            return Err(RasterError::ShapeMismatch {
                noise: noise.dim(),
                area: area.dim(),
                pixel: pixel_area_arcmin2.dim(),
            });
        }
        Ok(Self {
            noise,
            area,
            pixel_area_arcmin2,
        })
    }

    /// Convenience constructor for a uniform pixel scale.
    pub fn with_uniform_pixels(
        noise: Array2<f64>,
        area: Array2<f64>,
        pixel_area_arcmin2: f64,
    ) -> Result<Self, RasterError> {
        let pixel = Array2::from_elem(noise.dim(), pixel_area_arcmin2);
        Self::new(noise, area, pixel)
    }

    /// Valid sky area per pixel in deg².
    pub fn area_map_deg2(&self) -> Array2<f64> {
        let mut out = &self.area * &self.pixel_area_arcmin2;
        out.mapv_inplace(|v| v / 3600.0);
        out
    }
}

/// Sky bounding box of a tile in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyBounds {
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
}

impl SkyBounds {
    /// Half-open containment: RA in [ra_min, ra_max), dec in
    /// [dec_min, dec_max) so adjacent tiles never double-claim a point.
    pub fn contains(&self, ra_deg: f64, dec_deg: f64) -> bool {
        ra_deg >= self.ra_min
            && ra_deg < self.ra_max
            && dec_deg >= self.dec_min
            && dec_deg < self.dec_max
    }
}

/// Tile sky geometry: bounding box plus the area mask for per-pixel
/// membership tests. Uses a linear RA/dec ↔ pixel mapping, which is what
/// the tiled plate-carrée survey projection reduces to per tile.
#[derive(Debug, Clone)]
pub struct TileGeometry {
    bounds: SkyBounds,
    area: Array2<f64>,
}

impl TileGeometry {
    pub fn new(bounds: SkyBounds, area: Array2<f64>) -> Self {
        Self { bounds, area }
    }

    pub fn bounds(&self) -> SkyBounds {
        self.bounds
    }

    /// True if the coordinate falls on a valid-area pixel of this tile.
    pub fn contains(&self, ra_deg: f64, dec_deg: f64) -> bool {
        if !self.bounds.contains(ra_deg, dec_deg) {
            return false;
        }
        let (rows, cols) = self.area.dim();
        let fx = (ra_deg - self.bounds.ra_min) / (self.bounds.ra_max - self.bounds.ra_min);
        let fy =
            (dec_deg - self.bounds.dec_min) / (self.bounds.dec_max - self.bounds.dec_min);
        let x = ((fx * cols as f64) as usize).min(cols - 1);
        let y = ((fy * rows as f64) as usize).min(rows - 1);
        self.area[[y, x]] > 0.0
    }
}
