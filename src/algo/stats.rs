//! Normal-distribution helpers and weighted averages.

use scilib::math::basic::erf;
use std::f64::consts::SQRT_2;

/// Cumulative distribution function of the standard normal distribution.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

/// Survival function (upper tail) of a normal distribution with the given
/// mean and standard deviation, evaluated at `x`.
///
/// The upper tail is evaluated through the complementary error function
/// directly; forming `1 - normal_cdf` there cancels catastrophically and
/// breaks monotonicity once the tail drops below ~1e-8.
pub fn normal_sf(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    if z <= 0.0 {
        normal_cdf(-z)
    } else {
        0.5 * erfc_tail(z / SQRT_2)
    }
}

/// Complementary error function for non-negative arguments, via the
/// Abramowitz & Stegun 7.1.26 rational approximation. The polynomial form
/// decays smoothly to zero, so the tail stays positive and monotone.
fn erfc_tail(x: f64) -> f64 {
    const P: f64 = 0.327_591_1;
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;

    let t = 1.0 / (1.0 + P * x);
    let poly = t * (A1 + t * (A2 + t * (A3 + t * (A4 + t * A5))));
    poly * (-x * x).exp()
}

/// Weighted arithmetic mean. Weights need not be normalized.
///
/// # Panics
/// Panics if the slices differ in length or the weights sum to zero.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    assert_eq!(values.len(), weights.len(), "values/weights length mismatch");
    let wsum: f64 = weights.iter().sum();
    assert!(wsum != 0.0, "weights sum to zero");
    values
        .iter()
        .zip(weights.iter())
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / wsum
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cdf_known_values() {
        assert_relative_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-7);
        assert_relative_eq!(normal_cdf(1.0), 0.841344746, epsilon = 1e-6);
        assert_relative_eq!(normal_cdf(-1.0), 0.158655254, epsilon = 1e-6);
    }

    #[test]
    fn sf_is_complement_of_cdf() {
        // Upper and lower branches use different evaluations; they agree
        // to the rational approximation's accuracy
        for x in [-2.0, -0.5, 0.0, 0.7, 3.1] {
            assert_relative_eq!(
                normal_sf(x, 0.0, 1.0),
                1.0 - normal_cdf(x),
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn sf_is_monotone_deep_into_the_tail() {
        let mut prev = f64::INFINITY;
        for i in 0..=3200 {
            let z = -8.0 + i as f64 * 0.005;
            let s = normal_sf(z, 0.0, 1.0);
            assert!(s >= 0.0, "sf({z}) = {s}");
            assert!(s <= prev + 1e-9, "sf not monotone at z = {z}: {s} > {prev}");
            prev = s;
        }

        // The upper-tail branch decays without any slack needed
        let mut prev = normal_sf(0.0, 0.0, 1.0);
        for i in 1..=1600 {
            let z = i as f64 * 0.005;
            let s = normal_sf(z, 0.0, 1.0);
            assert!(s <= prev, "tail not monotone at z = {z}");
            prev = s;
        }
        assert!(normal_sf(8.0, 0.0, 1.0) < 1e-12);
    }

    #[test]
    fn sf_with_location_and_scale() {
        // P(X > mean) = 0.5 for any scale
        assert_relative_eq!(normal_sf(3.0, 3.0, 0.2), 0.5, epsilon = 1e-7);
        // Far above the mean the tail vanishes
        assert!(normal_sf(10.0, 0.0, 1.0) < 1e-6);
    }

    #[test]
    fn weighted_mean_basic() {
        assert_relative_eq!(
            weighted_mean(&[1.0, 3.0], &[1.0, 1.0]),
            2.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            weighted_mean(&[1.0, 3.0], &[3.0, 1.0]),
            1.5,
            epsilon = 1e-12
        );
    }
}
