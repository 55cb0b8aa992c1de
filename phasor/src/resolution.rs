//! Low-resolution ramp: early iterations see only the central part of the
//! diffraction data and use a wider support blur.

use crate::math;
use crate::params::ResolutionParams;
use crate::volume::Volume;

/// Gaussian width at which a centered mask spans the detector fraction.
const FWHM_TO_SIGMA: f64 = 2.35;

#[derive(Debug, Clone)]
pub struct Resolution {
    sigmas: Vec<f64>,
    dets: Vec<f64>,
}

impl Resolution {
    pub fn new(params: &ResolutionParams) -> Self {
        let (sigma_first, sigma_last) = params.sigma_range;
        let (det_first, det_last) = params.det_range;
        Self {
            sigmas: math::linspace(sigma_first, sigma_last, params.iterations),
            dets: math::linspace(det_first, det_last, params.iterations),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sigmas.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sigmas.is_empty()
    }

    /// Support blur width for `iteration`; the last ramp value past its end.
    pub fn sigma_at(&self, iteration: usize) -> f64 {
        ramp_value(&self.sigmas, iteration)
    }

    /// Detector fraction for `iteration`; the last ramp value past its end.
    pub fn det_at(&self, iteration: usize) -> f64 {
        ramp_value(&self.dets, iteration)
    }

    /// Measured amplitude attenuated by a Gaussian around the zero frequency
    /// whose width grows with the detector fraction.
    ///
    /// `data` keeps the DFT layout with the zero frequency at voxel 0, so the
    /// centered mask is shifted onto that layout before multiplying.
    pub fn filter_data(&self, data: &Volume<f64>, iteration: usize) -> Volume<f64> {
        let det = self.det_at(iteration);
        let dims = data.dims();
        let sigmas = std::array::from_fn(|axis| dims[axis] as f64 * det / FWHM_TO_SIGMA);
        let mask = math::gaussian_centered(dims, sigmas).ifftshift();
        data.zip_map(&mask, |&d, &m| d * m)
    }
}

fn ramp_value(values: &[f64], iteration: usize) -> f64 {
    let index = iteration.min(values.len().saturating_sub(1));
    values.get(index).copied().unwrap_or(1.0)
}
