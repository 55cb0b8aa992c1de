//! Numeric helpers shared by the estimators.

use std::f64::consts::PI;

use rayon::prelude::*;
use rustfft::num_complex::Complex64;

use crate::volume::{Dims, Volume};

/// Substitute denominator for exact zeros in reciprocal-space amplitudes.
pub const AMPLITUDE_EPSILON: f64 = 1e-4;

// Sums run sequentially: a parallel reduction tree depends on work
// stealing and would make repeated runs round differently.

/// Sum of squared magnitudes.
pub fn energy(values: &[Complex64]) -> f64 {
    values.iter().map(|v| v.norm_sqr()).sum()
}

/// Sum of squares of a real field.
pub fn energy_real(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Largest value, or `0.0` for an empty slice.
pub fn max(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values
        .par_iter()
        .copied()
        .reduce(|| f64::NEG_INFINITY, f64::max)
}

pub fn magnitude(volume: &Volume<Complex64>) -> Volume<f64> {
    volume.map(|v| v.norm())
}

/// `numerator / denominator` with zero wherever the denominator is exactly zero.
pub fn ratio(numerator: &Volume<f64>, denominator: &Volume<f64>) -> Volume<f64> {
    numerator.zip_map(denominator, |&n, &d| if d == 0.0 { 0.0 } else { n / d })
}

/// Centered separable Gaussian over `dims`, peak value 1.
///
/// Axis `k` uses standard deviation `sigmas[k]` measured in voxels from the
/// grid center `dims[k] / 2`.
pub fn gaussian_centered(dims: Dims, sigmas: [f64; 3]) -> Volume<f64> {
    let profiles: [Vec<f64>; 3] = std::array::from_fn(|axis| {
        let center = (dims[axis] / 2) as f64;
        let sigma = sigmas[axis];
        (0..dims[axis])
            .map(|i| {
                if sigma <= 0.0 {
                    return if i == dims[axis] / 2 { 1.0 } else { 0.0 };
                }
                let x = i as f64 - center;
                (-x * x / (2.0 * sigma * sigma)).exp()
            })
            .collect()
    });

    let mut data = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
    for &g0 in &profiles[0] {
        for &g1 in &profiles[1] {
            let g01 = g0 * g1;
            data.extend(profiles[2].iter().map(|&g2| g01 * g2));
        }
    }
    Volume::new(dims, data)
}

/// Frequency-domain widths for a real-space Gaussian blur of `sigma` voxels.
pub fn reciprocal_sigmas(dims: Dims, sigma: f64) -> [f64; 3] {
    std::array::from_fn(|axis| dims[axis] as f64 / (2.0 * PI * sigma))
}

/// `count` evenly spaced values from `first` to `last` inclusive.
pub fn linspace(first: f64, last: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![first],
        _ => {
            let step = (last - first) / (count - 1) as f64;
            (0..count).map(|i| first + step * i as f64).collect()
        }
    }
}

/// Smallest extent `>= dim` whose only prime factors are 2, 3 and 5.
pub fn fft_friendly_dim(dim: usize) -> usize {
    let mut candidate = dim.max(1);
    while !is_smooth(candidate) {
        candidate += 1;
    }
    candidate
}

fn is_smooth(mut n: usize) -> bool {
    for factor in [2, 3, 5] {
        while n % factor == 0 {
            n /= factor;
        }
    }
    n == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_and_sum() {
        let values = [Complex64::new(3.0, 4.0), Complex64::new(0.0, 1.0)];
        assert!((energy(&values) - 26.0).abs() < 1e-12);
        assert!((energy_real(&[1.0, -2.0]) - 5.0).abs() < 1e-12);
        assert!((sum(&[1.0, -2.0, 4.0]) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_max_handles_negative_and_empty() {
        assert_eq!(max(&[-3.0, -1.0, -2.0]), -1.0);
        assert_eq!(max(&[]), 0.0);
    }

    #[test]
    fn test_ratio_zero_guard() {
        let n = Volume::new([1, 1, 3], vec![1.0, 2.0, 3.0]);
        let d = Volume::new([1, 1, 3], vec![2.0, 0.0, 3.0]);
        assert_eq!(ratio(&n, &d).data(), &[0.5, 0.0, 1.0]);
    }

    #[test]
    fn test_gaussian_centered_peak_and_symmetry() {
        let g = gaussian_centered([5, 4, 1], [1.0, 1.5, 1.0]);
        assert_eq!(g[(2, 2, 0)], 1.0);
        assert!((g[(1, 2, 0)] - g[(3, 2, 0)]).abs() < 1e-12);
        assert!((g[(1, 2, 0)] - (-0.5f64).exp()).abs() < 1e-12);
        assert!(g.iter().all(|&v| v > 0.0 && v <= 1.0));
    }

    #[test]
    fn test_linspace_endpoints() {
        assert_eq!(linspace(2.0, 1.0, 3), vec![2.0, 1.5, 1.0]);
        assert_eq!(linspace(2.0, 1.0, 1), vec![2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_fft_friendly_dim() {
        assert_eq!(fft_friendly_dim(7), 8);
        assert_eq!(fft_friendly_dim(11), 12);
        assert_eq!(fft_friendly_dim(30), 30);
        assert_eq!(fft_friendly_dim(31), 32);
        assert_eq!(fft_friendly_dim(0), 1);
    }
}
