//! Support estimation: shrink-wrap from the image amplitude, optional phase
//! constraint and twin-image suppression.

use rustfft::num_complex::Complex64;

use crate::fft::Fft3;
use crate::math;
use crate::params::{PhaseParams, SupportParams};
use crate::volume::{Dims, Volume};

/// Upper bound on threshold reductions during one adaptive update.
const MAX_THRESHOLD_ROUNDS: usize = 8;

/// Owns the support mask and the state needed to update it.
#[derive(Debug)]
pub struct Support {
    mask: Volume<bool>,
    threshold: f64,
    min_fraction: Option<f64>,
    last_threshold: f64,
    phase_range: Option<(f64, f64)>,
    /// Mask the phase constraint is applied to; cleared by amplitude updates.
    phase_base: Option<Volume<bool>>,
    /// Frequency-domain Gaussian for the sigma it was built with.
    gaussian: Option<(f64, Volume<f64>)>,
    fft: Fft3,
}

impl Support {
    /// Starts from a centered box of `params.area` voxels.
    pub fn new(dims: Dims, params: &SupportParams, phase: Option<&PhaseParams>) -> Self {
        Self::with_mask(initial_mask(dims, params.area), params, phase)
    }

    /// Starts from an existing mask, e.g. from an earlier run.
    pub fn with_mask(mask: Volume<bool>, params: &SupportParams, phase: Option<&PhaseParams>) -> Self {
        let dims = mask.dims();
        Self {
            mask,
            threshold: params.threshold,
            min_fraction: params.min_fraction,
            last_threshold: params.threshold,
            phase_range: phase.map(|p| (p.min, p.max)),
            phase_base: None,
            gaussian: None,
            fft: Fft3::new(dims),
        }
    }

    #[inline]
    pub fn mask(&self) -> &Volume<bool> {
        &self.mask
    }

    pub fn into_mask(self) -> Volume<bool> {
        self.mask
    }

    pub fn voxel_count(&self) -> usize {
        self.mask.iter().filter(|&&inside| inside).count()
    }

    /// Fraction of the grid inside the support.
    pub fn coverage(&self) -> f64 {
        self.voxel_count() as f64 / self.mask.len() as f64
    }

    /// Threshold used by the latest amplitude update.
    #[inline]
    pub fn last_threshold(&self) -> f64 {
        self.last_threshold
    }

    /// The mask restricted to the lower half of the first two axes.
    pub fn twin_suppressed(&self) -> Volume<bool> {
        let [d0, d1, _] = self.mask.dims();
        let mut mask = self.mask.clone();
        for (index, inside) in mask.iter_mut().enumerate() {
            let [i0, i1, _] = self.mask.coords_of(index);
            if i0 >= d0 / 2 || i1 >= d1 / 2 {
                *inside = false;
            }
        }
        mask
    }

    /// The mask as 0/1 values.
    pub fn to_numeric(&self) -> Volume<f64> {
        self.mask.map(|&inside| if inside { 1.0 } else { 0.0 })
    }

    /// Shrink-wrap: blur `|image|` by `sigma` voxels and keep voxels at or
    /// above `threshold × max`.
    pub fn update_amplitude(&mut self, image: &Volume<Complex64>, sigma: f64) {
        assert!(image.same_dims(&self.mask), "image dims mismatch");

        let smoothed = self.gauss_conv_fft(&math::magnitude(image), sigma);
        let peak = math::max(smoothed.data());
        if peak <= 0.0 {
            tracing::warn!("Image amplitude is zero, keeping the previous support");
            return;
        }

        let mut threshold = self.threshold;
        let mut mask = threshold_mask(&smoothed, threshold * peak);
        if let Some(min_fraction) = self.min_fraction {
            let total = mask.len() as f64;
            let mut rounds = 0;
            while (count(&mask) as f64 / total) < min_fraction && rounds < MAX_THRESHOLD_ROUNDS {
                threshold /= 10.0;
                mask = threshold_mask(&smoothed, threshold * peak);
                rounds += 1;
            }
        }

        self.mask = mask;
        self.last_threshold = threshold;
        self.phase_base = None;
        tracing::debug!(
            sigma,
            threshold,
            voxels = self.voxel_count(),
            "Support updated from amplitude"
        );
    }

    /// Masks out voxels whose phase leaves the configured range.
    ///
    /// The first call after an amplitude update constrains the current mask
    /// and caches the result as the base for later calls.
    pub fn update_phase(&mut self, image: &Volume<Complex64>) {
        assert!(image.same_dims(&self.mask), "image dims mismatch");
        let Some((min, max)) = self.phase_range else {
            return;
        };

        let in_range = image.map(|v| {
            let phase = v.arg();
            phase >= min && phase <= max
        });
        match &self.phase_base {
            Some(base) => {
                self.mask = base.zip_map(&in_range, |&b, &ok| b && ok);
            }
            None => {
                self.mask = self.mask.zip_map(&in_range, |&m, &ok| m && ok);
                self.phase_base = Some(self.mask.clone());
            }
        }
        tracing::debug!(voxels = self.voxel_count(), "Support updated from phase");
    }

    /// Gaussian blur through Fourier multiplication. The result is
    /// non-negative and has the same sum as `magnitude`.
    pub fn gauss_conv_fft(&mut self, magnitude: &Volume<f64>, sigma: f64) -> Volume<f64> {
        let dims = magnitude.dims();
        let stale = self.gaussian.as_ref().is_none_or(|(cached, _)| *cached != sigma);
        if stale {
            let gaussian = math::gaussian_centered(dims, math::reciprocal_sigmas(dims, sigma));
            self.gaussian = Some((sigma, gaussian));
        }

        let mut field = magnitude.map(|&v| Complex64::new(v, 0.0));
        self.fft.forward(&mut field);
        let mut shifted = field.fftshift();
        if let Some((_, gaussian)) = &self.gaussian {
            shifted
                .iter_mut()
                .zip(gaussian.iter())
                .for_each(|(v, &g)| *v *= g);
        }
        let mut field = shifted.ifftshift();
        self.fft.inverse(&mut field);

        let mut smoothed = field.map(|v| v.re.max(0.0));
        let before = math::sum(magnitude.data());
        let after = math::sum(smoothed.data());
        if after > 0.0 {
            let scale = before / after;
            smoothed.iter_mut().for_each(|v| *v *= scale);
        }
        smoothed
    }

    /// Sigma of the cached frequency-domain Gaussian.
    pub fn cached_sigma(&self) -> Option<f64> {
        self.gaussian.as_ref().map(|(sigma, _)| *sigma)
    }

    pub fn release_scratch(&mut self) {
        self.fft.release_scratch();
    }
}

/// Centered box of `area` voxels on a `dims` grid.
pub fn initial_mask(dims: Dims, area: Dims) -> Volume<bool> {
    Volume::new_filled(area, true).pad_around(dims, false)
}

fn threshold_mask(values: &Volume<f64>, cutoff: f64) -> Volume<bool> {
    values.map(|&v| v >= cutoff)
}

fn count(mask: &Volume<bool>) -> usize {
    mask.iter().filter(|&&inside| inside).count()
}
