//! Conversions between mean-density and critical-density mass
//! definitions.
//!
//! M₂₀₀ₘ → M₅₀₀c follows the NFW rescaling of Hu & Kravtsov (2003) with
//! the Bhattacharya et al. (2013) concentration-mass relation. The shape
//! function and its inverse are tabulated once per converter as spline
//! pairs, so repeated conversions cost two spline lookups and a little
//! arithmetic. The reverse direction iterates the forward conversion.

use crate::algo::spline::{CubicSpline, SplineError};
use crate::cosmology::CosmologyParams;
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MassConversionError {
    #[error("mass must be positive, got {0} MSun")]
    NonPositiveMass(f64),

    #[error("M500c -> M200m iteration did not converge after {iterations} steps (ratio {ratio})")]
    NoConvergence { iterations: usize, ratio: f64 },

    #[error(transparent)]
    Spline(#[from] SplineError),
}

/// NFW shape function x³ (ln(1 + 1/x) − 1/(1 + x)).
fn nfw_shape(x: f64) -> f64 {
    x.powi(3) * ((1.0 + 1.0 / x).ln() - 1.0 / (1.0 + x))
}

/// Tabulated NFW mass-definition converter for one cosmology.
#[derive(Debug)]
pub struct MassConverter {
    cosmo: CosmologyParams,
    f_of_x: CubicSpline,
    x_of_f: CubicSpline,
}

impl MassConverter {
    const X_MIN: f64 = 1e-3;
    const X_MAX: f64 = 10.0;
    const X_SAMPLES: usize = 1000;

    const TOLERANCE: f64 = 1e-5;
    const MAX_ITERATIONS: usize = 10;

    pub fn new(cosmo: CosmologyParams) -> Result<Self, MassConversionError> {
        let step = (Self::X_MAX - Self::X_MIN) / (Self::X_SAMPLES - 1) as f64;
        let x: Vec<f64> = (0..Self::X_SAMPLES)
            .map(|i| Self::X_MIN + step * i as f64)
            .collect();
        let fx: Vec<f64> = x.iter().map(|&xi| nfw_shape(xi)).collect();
        let f_of_x = CubicSpline::new(x.clone(), fx.clone())?;
        let x_of_f = CubicSpline::new(fx, x)?;
        Ok(Self {
            cosmo,
            f_of_x,
            x_of_f,
        })
    }

    pub fn cosmology(&self) -> &CosmologyParams {
        &self.cosmo
    }

    /// Bhattacharya et al. (2013) concentration for an M₂₀₀ₘ halo.
    fn c200m(&self, m200m: f64, z: f64) -> f64 {
        let growth = self.cosmo.linear_growth(z);
        let pivot = 5e13 / (self.cosmo.h0 / 100.0);
        let nu = (1.12 * (m200m / pivot).powf(0.3) + 0.53) / growth;
        growth.powf(1.15) * 9.0 * nu.powf(-0.29)
    }

    /// Convert M₂₀₀ₘ (MSun) to the critical-density definition.
    ///
    /// Returns (M₅₀₀c in MSun, R₅₀₀c in Mpc).
    pub fn m200m_to_m500c(
        &self,
        m200m: f64,
        z: f64,
    ) -> Result<(f64, f64), MassConversionError> {
        if m200m <= 0.0 {
            return Err(MassConversionError::NonPositiveMass(m200m));
        }
        let rho_mean = self.cosmo.mean_density(z);
        let rho_crit = self.cosmo.critical_density(z);

        let c200m = self.c200m(m200m, z);
        let r200m = (3.0 * m200m / (4.0 * PI * 200.0 * rho_mean)).powf(1.0 / 3.0);
        let rs = r200m / c200m;

        // Match enclosed NFW mass at the new overdensity
        let f_rs = (500.0 * rho_crit) / (200.0 * rho_mean) * self.f_of_x.evaluate(1.0 / c200m);
        let x_rs = self.x_of_f.evaluate(f_rs);

        let r500c = rs / x_rs;
        let m500c = (4.0 / 3.0) * PI * r500c.powi(3) * 500.0 * rho_crit;
        Ok((m500c, r500c))
    }

    /// Convert M₅₀₀c (MSun) to the mean-density definition.
    ///
    /// Iterates the forward conversion from a 3× starting guess until the
    /// implied M₅₀₀c matches to a relative tolerance of 10⁻⁵.
    pub fn m500c_to_m200m(&self, m500c: f64, z: f64) -> Result<f64, MassConversionError> {
        if m500c <= 0.0 {
            return Err(MassConversionError::NonPositiveMass(m500c));
        }
        let mut m200m = 3.0 * m500c;
        let mut ratio = f64::INFINITY;
        for _ in 0..Self::MAX_ITERATIONS {
            let (m500c_trial, _) = self.m200m_to_m500c(m200m, z)?;
            ratio = m500c / m500c_trial;
            // The correction is applied before the convergence check, so
            // the returned mass carries less than a tolerance of error
            m200m *= ratio;
            if (ratio - 1.0).abs() < Self::TOLERANCE {
                return Ok(m200m);
            }
        }
        Err(MassConversionError::NoConvergence {
            iterations: Self::MAX_ITERATIONS,
            ratio,
        })
    }
}
