//! Three-dimensional discrete Fourier transforms and FFT-based convolution.
//!
//! The 3-D transform is computed separably: contiguous lanes along the last
//! axis are transformed in one batched call, the two outer axes are gathered
//! into a lane buffer, transformed and scattered back.

use std::collections::HashMap;
use std::sync::Arc;

use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::math::fft_friendly_dim;
use crate::volume::{Dims, Volume, voxel_count};

/// Cached forward and inverse plans for one grid shape.
///
/// The forward transform is unnormalized; the inverse divides by the voxel
/// count so that `inverse(forward(x)) == x`.
pub struct Fft3 {
    dims: Dims,
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
    scratch: Vec<Complex64>,
    lane: Vec<Complex64>,
}

impl std::fmt::Debug for Fft3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft3").field("dims", &self.dims).finish()
    }
}

impl Fft3 {
    pub fn new(dims: Dims) -> Self {
        assert!(
            dims.iter().all(|&d| d > 0),
            "FFT dims must be positive, got {:?}",
            dims
        );
        let mut planner = FftPlanner::new();
        let forward = std::array::from_fn(|axis| planner.plan_fft_forward(dims[axis]));
        let inverse = std::array::from_fn(|axis| planner.plan_fft_inverse(dims[axis]));

        Self {
            dims,
            forward,
            inverse,
            scratch: Vec::new(),
            lane: Vec::new(),
        }
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        self.dims
    }

    /// In-place unnormalized forward transform.
    pub fn forward(&mut self, volume: &mut Volume<Complex64>) {
        assert_eq!(volume.dims(), self.dims, "FFT plan dims mismatch");
        let plans = self.forward.clone();
        self.transform(volume.data_mut(), &plans);
    }

    /// In-place inverse transform, normalized by the voxel count.
    pub fn inverse(&mut self, volume: &mut Volume<Complex64>) {
        assert_eq!(volume.dims(), self.dims, "FFT plan dims mismatch");
        let plans = self.inverse.clone();
        self.transform(volume.data_mut(), &plans);
        let scale = 1.0 / voxel_count(self.dims) as f64;
        volume.iter_mut().for_each(|v| *v *= scale);
    }

    /// Drops the cached work buffers. They are reallocated on the next transform.
    pub fn release_scratch(&mut self) {
        self.scratch = Vec::new();
        self.lane = Vec::new();
    }

    fn transform(&mut self, data: &mut [Complex64], plans: &[Arc<dyn Fft<f64>>; 3]) {
        let [d0, d1, d2] = self.dims;

        let scratch_len = plans
            .iter()
            .map(|p| p.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);
        if self.scratch.len() < scratch_len {
            self.scratch.resize(scratch_len, Complex64::default());
        }
        if self.lane.len() < d0.max(d1) {
            self.lane.resize(d0.max(d1), Complex64::default());
        }

        // last axis: contiguous lanes, one batched call
        if d2 > 1 {
            plans[2].process_with_scratch(data, &mut self.scratch[..scratch_len]);
        }

        // middle axis: stride d2
        if d1 > 1 {
            let lane = &mut self.lane[..d1];
            for i0 in 0..d0 {
                let block = i0 * d1 * d2;
                for i2 in 0..d2 {
                    for (i1, slot) in lane.iter_mut().enumerate() {
                        *slot = data[block + i1 * d2 + i2];
                    }
                    plans[1].process_with_scratch(lane, &mut self.scratch[..scratch_len]);
                    for (i1, value) in lane.iter().enumerate() {
                        data[block + i1 * d2 + i2] = *value;
                    }
                }
            }
        }

        // first axis: stride d1 * d2
        if d0 > 1 {
            let stride = d1 * d2;
            let lane = &mut self.lane[..d0];
            for offset in 0..stride {
                for (i0, slot) in lane.iter_mut().enumerate() {
                    *slot = data[i0 * stride + offset];
                }
                plans[0].process_with_scratch(lane, &mut self.scratch[..scratch_len]);
                for (i0, value) in lane.iter().enumerate() {
                    data[i0 * stride + offset] = *value;
                }
            }
        }
    }
}

/// Linear (zero-padded, non-wrapping) convolution of two real volumes,
/// cropped to the center so the result has the dims of `input`.
///
/// Equivalent to `scipy.signal.fftconvolve(input, kernel, mode="same")`.
pub fn fft_convolve_same(input: &Volume<f64>, kernel: &Volume<f64>) -> Volume<f64> {
    FftConvolver::default().convolve_same(input, kernel)
}

/// FFT convolution with transform plans cached per padded shape.
#[derive(Debug, Default)]
pub struct FftConvolver {
    plans: HashMap<Dims, Fft3>,
}

impl FftConvolver {
    /// See [`fft_convolve_same`].
    pub fn convolve_same(&mut self, input: &Volume<f64>, kernel: &Volume<f64>) -> Volume<f64> {
        let a = input.dims();
        let b = kernel.dims();
        let full: Dims = std::array::from_fn(|axis| a[axis] + b[axis] - 1);
        let padded: Dims = std::array::from_fn(|axis| fft_friendly_dim(full[axis]));

        let fft = self
            .plans
            .entry(padded)
            .or_insert_with(|| Fft3::new(padded));
        let mut lhs = input
            .map(|&v| Complex64::new(v, 0.0))
            .pad_corner(padded, Complex64::default());
        let mut rhs = kernel
            .map(|&v| Complex64::new(v, 0.0))
            .pad_corner(padded, Complex64::default());

        fft.forward(&mut lhs);
        fft.forward(&mut rhs);
        lhs.iter_mut().zip(rhs.iter()).for_each(|(l, r)| *l *= *r);
        fft.inverse(&mut lhs);

        let start: [usize; 3] = std::array::from_fn(|axis| (full[axis] - a[axis]) / 2);
        lhs.window(start, a).map(|v| v.re)
    }

    pub fn release_scratch(&mut self) {
        self.plans.values_mut().for_each(Fft3::release_scratch);
    }
}

#[cfg(test)]
mod tests;
