//! Flat ΛCDM background cosmology.
//!
//! Everything the selection-function calculation needs from the background
//! expansion: E(z), densities, the angular-diameter distance and the linear
//! growth factor. Parameters are an explicit immutable value object passed
//! into every call; there is no shared mutable cosmology state anywhere in
//! the crate.

use serde::{Deserialize, Serialize};

/// Newton's constant in MSun⁻¹ km² s⁻² Mpc.
const G_MSUN_KM2_S2_MPC: f64 = 4.301e-9;

/// Speed of light in km/s.
const C_KM_S: f64 = 299_792.458;

/// Flat ΛCDM parameter set.
///
/// Immutable once constructed; routines that depend on cosmology take this
/// by reference rather than consulting any global.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CosmologyParams {
    /// Hubble constant in km/s/Mpc.
    pub h0: f64,
    /// Matter density parameter at z = 0.
    pub omega_m0: f64,
    /// Dark-energy density parameter at z = 0.
    pub omega_l0: f64,
    /// Baryon density parameter at z = 0.
    pub omega_b0: f64,
    /// Power-spectrum normalization.
    pub sigma8: f64,
}

impl Default for CosmologyParams {
    /// Fiducial survey cosmology.
    fn default() -> Self {
        Self {
            h0: 70.0,
            omega_m0: 0.30,
            omega_l0: 0.70,
            omega_b0: 0.05,
            sigma8: 0.8,
        }
    }
}

impl CosmologyParams {
    /// Dimensionless Hubble parameter E(z) = H(z)/H0.
    pub fn ez(&self, z: f64) -> f64 {
        (self.omega_m0 * (1.0 + z).powi(3) + self.omega_l0).sqrt()
    }

    /// Hubble parameter H(z) in km/s/Mpc.
    pub fn hz(&self, z: f64) -> f64 {
        self.h0 * self.ez(z)
    }

    /// Matter density parameter at redshift z.
    pub fn omega_m(&self, z: f64) -> f64 {
        let ez2 = self.ez(z).powi(2);
        self.omega_m0 * (1.0 + z).powi(3) / ez2
    }

    /// Critical density at redshift z in MSun/Mpc³.
    pub fn critical_density(&self, z: f64) -> f64 {
        let hz = self.hz(z);
        3.0 * hz * hz / (8.0 * std::f64::consts::PI * G_MSUN_KM2_S2_MPC)
    }

    /// Mean matter density at redshift z in MSun/Mpc³.
    pub fn mean_density(&self, z: f64) -> f64 {
        self.omega_m(z) * self.critical_density(z)
    }

    /// Comoving distance to redshift z in Mpc (trapezoidal integration).
    pub fn comoving_distance(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        let n = 512;
        let dz = z / n as f64;
        let mut sum = 0.0;
        let mut prev = 1.0 / self.ez(0.0);
        for i in 1..=n {
            let zi = i as f64 * dz;
            let cur = 1.0 / self.ez(zi);
            sum += 0.5 * (prev + cur) * dz;
            prev = cur;
        }
        (C_KM_S / self.h0) * sum
    }

    /// Angular-diameter distance to redshift z in Mpc.
    pub fn angular_diameter_distance(&self, z: f64) -> f64 {
        self.comoving_distance(z) / (1.0 + z)
    }

    /// Unnormalized linear growth factor g(z).
    ///
    /// g(z) = E(z) ∫_z^∞ (1 + z') / E(z')³ dz', integrated to z = 1000 in
    /// steps of 0.1. The H0³ prefactor is omitted; it cancels in the
    /// normalized growth factor below.
    pub fn growth_factor(&self, z: f64) -> f64 {
        let z_max = 1000.0;
        let dz = 0.1;
        let n = ((z_max - z) / dz).ceil() as usize;
        let mut sum = 0.0;
        let mut z_prev = z;
        let mut f_prev = (1.0 + z_prev) / self.ez(z_prev).powi(3);
        for i in 1..=n {
            let zi = (z + i as f64 * dz).min(z_max);
            let fi = (1.0 + zi) / self.ez(zi).powi(3);
            sum += 0.5 * (f_prev + fi) * (zi - z_prev);
            z_prev = zi;
            f_prev = fi;
        }
        self.ez(z) * sum
    }

    /// Linear growth factor normalized to D(0) = 1.
    pub fn linear_growth(&self, z: f64) -> f64 {
        self.growth_factor(z) / self.growth_factor(0.0)
    }

    /// R500c in Mpc for a mass M500c (MSun) at redshift z, defined against
    /// 500 times the critical density.
    pub fn r500c_mpc(&self, m500c: f64, z: f64) -> f64 {
        let rho_crit = self.critical_density(z);
        (3.0 * m500c / (4.0 * std::f64::consts::PI * 500.0 * rho_crit)).powf(1.0 / 3.0)
    }

    /// Angular size in arcmin subtended by R500c at redshift z.
    pub fn theta500_arcmin(&self, m500c: f64, z: f64) -> f64 {
        let r500 = self.r500c_mpc(m500c, z);
        (r500 / self.angular_diameter_distance(z)).atan().to_degrees() * 60.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ez_at_zero_is_unity_for_flat_universe() {
        let cosmo = CosmologyParams::default();
        assert_relative_eq!(cosmo.ez(0.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn ez_increases_with_redshift() {
        let cosmo = CosmologyParams::default();
        assert!(cosmo.ez(1.0) > cosmo.ez(0.5));
        assert!(cosmo.ez(0.5) > cosmo.ez(0.0));
    }

    #[test]
    fn critical_density_order_of_magnitude() {
        // rho_crit(0) for h = 0.7 is about 1.4e11 MSun/Mpc^3
        let cosmo = CosmologyParams::default();
        let rho = cosmo.critical_density(0.0);
        assert!(rho > 1e11 && rho < 2e11, "rho_crit = {rho:e}");
    }

    #[test]
    fn mean_density_scales_with_omega_m() {
        let cosmo = CosmologyParams::default();
        assert_relative_eq!(
            cosmo.mean_density(0.0),
            cosmo.omega_m0 * cosmo.critical_density(0.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn angular_diameter_distance_reasonable() {
        // d_A(0.5) for the fiducial cosmology is about 1250-1350 Mpc
        let cosmo = CosmologyParams::default();
        let da = cosmo.angular_diameter_distance(0.5);
        assert!(da > 1200.0 && da < 1400.0, "d_A(0.5) = {da}");
        assert_eq!(cosmo.angular_diameter_distance(0.0), 0.0);
    }

    #[test]
    fn growth_factor_decreases_with_redshift() {
        let cosmo = CosmologyParams::default();
        assert_relative_eq!(cosmo.linear_growth(0.0), 1.0, epsilon = 1e-12);
        let d_half = cosmo.linear_growth(0.5);
        let d_one = cosmo.linear_growth(1.0);
        assert!(d_half < 1.0 && d_one < d_half);
        // Matter-dominated limit: D ~ 1/(1+z)
        assert!(d_one > 0.4 && d_one < 0.8, "D(1) = {d_one}");
    }

    #[test]
    fn theta500_shrinks_with_distance() {
        let cosmo = CosmologyParams::default();
        let near = cosmo.theta500_arcmin(3e14, 0.2);
        let far = cosmo.theta500_arcmin(3e14, 1.0);
        assert!(near > far);
        // A 3e14 MSun cluster at z = 0.5 subtends a few arcmin
        let mid = cosmo.theta500_arcmin(3e14, 0.5);
        assert!(mid > 1.0 && mid < 10.0, "theta500 = {mid}");
    }
}
