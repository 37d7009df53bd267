//! Mass–observable scaling relation.
//!
//! The relation linking true halo mass to the expected central Comptonization
//! signal y₀, following the universal pressure profile parameterization:
//!
//!   y₀ = A · E(z)² · (M / M_pivot)^(1 + B) · Q(θ₅₀₀) · f_rel
//!
//! with log-normal intrinsic scatter σ_int about the mean relation.

use crate::cosmology::CosmologyParams;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures when constructing a [`ScalingRelation`].
#[derive(Debug, Error)]
pub enum ScalingRelationError {
    #[error("{field} must be finite, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("intrinsic scatter must be non-negative, got {0}")]
    NegativeScatter(f64),
}

/// Immutable, validated scaling-relation parameter set.
///
/// Constructed once per analysis; all fields are checked up front so the
/// grid computations never see a malformed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingRelation {
    /// Normalization A (the relation amplitude, typically ~5e-5).
    pub ten_to_a0: f64,
    /// Mass slope B; the signal scales as M^(1 + B).
    pub mass_slope: f64,
    /// Pivot mass in MSun.
    pub pivot_mass_msun: f64,
    /// Log-normal intrinsic scatter about the mean relation.
    pub intrinsic_scatter: f64,
}

impl ScalingRelation {
    pub fn new(
        ten_to_a0: f64,
        mass_slope: f64,
        pivot_mass_msun: f64,
        intrinsic_scatter: f64,
    ) -> Result<Self, ScalingRelationError> {
        for (field, value) in [
            ("ten_to_a0", ten_to_a0),
            ("mass_slope", mass_slope),
            ("pivot_mass_msun", pivot_mass_msun),
            ("intrinsic_scatter", intrinsic_scatter),
        ] {
            if !value.is_finite() {
                return Err(ScalingRelationError::NotFinite { field, value });
            }
        }
        if ten_to_a0 <= 0.0 {
            return Err(ScalingRelationError::NotPositive {
                field: "ten_to_a0",
                value: ten_to_a0,
            });
        }
        if pivot_mass_msun <= 0.0 {
            return Err(ScalingRelationError::NotPositive {
                field: "pivot_mass_msun",
                value: pivot_mass_msun,
            });
        }
        if intrinsic_scatter < 0.0 {
            return Err(ScalingRelationError::NegativeScatter(intrinsic_scatter));
        }
        Ok(Self {
            ten_to_a0,
            mass_slope,
            pivot_mass_msun,
            intrinsic_scatter,
        })
    }

    /// UPP-calibrated defaults (A = 4.95e-5, B = 0.08, pivot 3e14 MSun,
    /// scatter 0.2).
    pub fn upp_default() -> Self {
        Self {
            ten_to_a0: 4.95e-5,
            mass_slope: 0.08,
            pivot_mass_msun: 3e14,
            intrinsic_scatter: 0.2,
        }
    }

    /// Mean (unscattered) y₀ for a halo of mass `m500` (MSun), given the
    /// dimensionless Hubble parameter, filter response and relativistic
    /// correction at that mass and redshift.
    pub fn predict_y0(&self, ez: f64, m500: f64, q: f64, f_rel: f64) -> f64 {
        self.ten_to_a0
            * ez.powi(2)
            * (m500 / self.pivot_mass_msun).powf(1.0 + self.mass_slope)
            * q
            * f_rel
    }
}

/// Relativistic correction f_rel = 1 + δ_SZE to the SZ signal at the given
/// observing frequency.
///
/// Cluster temperature comes from the Arnaud et al. (2005) M–T relation;
/// the frequency-dependent correction follows the Itoh et al. (1998)
/// expansion through fourth order in θ_e.
pub fn f_rel(cosmo: &CosmologyParams, z: f64, m500: f64, obs_freq_ghz: f64) -> f64 {
    const H_PLANCK: f64 = 6.63e-34;
    const K_B: f64 = 1.38e-23;
    const M_E: f64 = 9.11e-31;
    const E_CHARGE: f64 = 1.6e-19;
    const C_LIGHT: f64 = 3e8;
    const T_CMB: f64 = 2.726;

    // Arnaud et al. (2005) M-T relation
    let a = 3.84e14;
    let b = 1.71;
    let t_kev = 5.0 * ((cosmo.ez(z) * m500) / a).powf(1.0 / b);
    let t_kelvin = t_kev * (1000.0 * E_CHARGE) / K_B;

    let theta_e = (K_B * t_kelvin) / (M_E * C_LIGHT * C_LIGHT);
    let x = (H_PLANCK * obs_freq_ghz * 1e9) / (K_B * T_CMB);
    let xtw = x * (x / 2.0).cosh() / (x / 2.0).sinh();
    let stw = x / (x / 2.0).sinh();

    let y0 = -4.0 + xtw;
    let y1 = -10.0 + (47.0 / 2.0) * xtw - (42.0 / 5.0) * xtw.powi(2)
        + (7.0 / 10.0) * xtw.powi(3)
        + stw.powi(2) * (-(21.0 / 5.0) + (7.0 / 5.0) * xtw);
    let y2 = -(15.0 / 2.0) + (1023.0 / 8.0) * xtw - (868.0 / 5.0) * xtw.powi(2)
        + (329.0 / 5.0) * xtw.powi(3)
        - (44.0 / 5.0) * xtw.powi(4)
        + (11.0 / 30.0) * xtw.powi(5)
        + stw.powi(2)
            * (-(434.0 / 5.0) + (658.0 / 5.0) * xtw - (242.0 / 5.0) * xtw.powi(2)
                + (143.0 / 30.0) * xtw.powi(3))
        + stw.powi(4) * (-(44.0 / 5.0) + (187.0 / 60.0) * xtw);
    let y3 = (15.0 / 2.0) + (2505.0 / 8.0) * xtw - (7098.0 / 5.0) * xtw.powi(2)
        + (14253.0 / 10.0) * xtw.powi(3)
        - (18594.0 / 35.0) * xtw.powi(4)
        + (12059.0 / 140.0) * xtw.powi(5)
        - (128.0 / 21.0) * xtw.powi(6)
        + (16.0 / 105.0) * xtw.powi(7)
        + stw.powi(2)
            * (-(7098.0 / 10.0) + (14253.0 / 5.0) * xtw - (102267.0 / 35.0) * xtw.powi(2)
                + (156767.0 / 140.0) * xtw.powi(3)
                - (1216.0 / 7.0) * xtw.powi(4)
                + (64.0 / 7.0) * xtw.powi(5))
        + stw.powi(4)
            * (-(18594.0 / 35.0) + (205003.0 / 280.0) * xtw - (1920.0 / 7.0) * xtw.powi(2)
                + (1024.0 / 35.0) * xtw.powi(3))
        + stw.powi(6) * (-(544.0 / 21.0) + (992.0 / 105.0) * xtw);
    let y4 = -(135.0 / 32.0) + (30375.0 / 128.0) * xtw - (62391.0 / 10.0) * xtw.powi(2)
        + (614727.0 / 40.0) * xtw.powi(3)
        - (124389.0 / 10.0) * xtw.powi(4)
        + (355703.0 / 80.0) * xtw.powi(5)
        - (16568.0 / 21.0) * xtw.powi(6)
        + (7516.0 / 105.0) * xtw.powi(7)
        - (22.0 / 7.0) * xtw.powi(8)
        + (11.0 / 210.0) * xtw.powi(9)
        + stw.powi(2)
            * (-(62391.0 / 20.0) + (614727.0 / 20.0) * xtw
                - (1368279.0 / 20.0) * xtw.powi(2)
                + (4624139.0 / 80.0) * xtw.powi(3)
                - (157396.0 / 7.0) * xtw.powi(4)
                + (30064.0 / 7.0) * xtw.powi(5)
                - (2717.0 / 7.0) * xtw.powi(6)
                + (2761.0 / 210.0) * xtw.powi(7))
        + stw.powi(4)
            * (-(124389.0 / 10.0) + (6046951.0 / 160.0) * xtw
                - (248520.0 / 7.0) * xtw.powi(2)
                + (481024.0 / 35.0) * xtw.powi(3)
                - (15972.0 / 7.0) * xtw.powi(4)
                + (18689.0 / 140.0) * xtw.powi(5))
        + stw.powi(6)
            * (-(70414.0 / 21.0) + (465992.0 / 105.0) * xtw - (11792.0 / 7.0) * xtw.powi(2)
                + (19778.0 / 105.0) * xtw.powi(3))
        + stw.powi(8) * (-(682.0 / 7.0) + (7601.0 / 210.0) * xtw);

    let prefactor = (x.powi(3) / (x.exp() - 1.0))
        * ((theta_e * x * x.exp()) / (x.exp() - 1.0));
    let delta_sze = prefactor
        * (y0 + y1 * theta_e
            + y2 * theta_e.powi(2)
            + y3 * theta_e.powi(3)
            + y4 * theta_e.powi(4));

    1.0 + delta_sze
}
