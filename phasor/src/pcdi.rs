//! Partial coherence correction.
//!
//! A partially coherent beam blurs the measured intensity with a coherence
//! kernel. The estimator keeps such a kernel over a small centered region of
//! interest, applies it to the modeled intensity and refines it from time to
//! time by Richardson-Lucy deconvolution against the measured intensity.

use crate::config::PcdiAlgorithm;
use crate::error::{Error, Result};
use crate::fft::FftConvolver;
use crate::math;
use crate::params::PcdiParams;
use crate::volume::{Dims, Volume};

#[derive(Debug)]
pub struct PartialCoherence {
    algorithm: PcdiAlgorithm,
    roi: Dims,
    normalize: bool,
    iterations: usize,
    clip: bool,
    kernel: Volume<f64>,
    /// Squared measured amplitude cropped to the ROI.
    measured_roi: Option<Volume<f64>>,
    /// Modeled amplitude from the previous iteration, cropped to the ROI.
    previous: Option<Volume<f64>>,
    refinements: usize,
    convolver: FftConvolver,
}

impl PartialCoherence {
    /// Seeds the kernel flat unless one is supplied.
    pub fn new(params: &PcdiParams, kernel: Option<Volume<f64>>) -> Result<Self> {
        let kernel = match kernel {
            Some(kernel) if kernel.dims() != params.roi => {
                return Err(Error::DimensionMismatch {
                    what: "coherence kernel",
                    expected: params.roi,
                    actual: kernel.dims(),
                });
            }
            Some(kernel) => kernel,
            None => flat_kernel(params.roi),
        };

        Ok(Self {
            algorithm: params.algorithm,
            roi: params.roi,
            normalize: params.normalize,
            iterations: params.iterations,
            clip: params.clip,
            kernel,
            measured_roi: None,
            previous: None,
            refinements: 0,
            convolver: FftConvolver::default(),
        })
    }

    #[inline]
    pub fn roi(&self) -> Dims {
        self.roi
    }

    #[inline]
    pub fn kernel(&self) -> &Volume<f64> {
        &self.kernel
    }

    pub fn into_kernel(self) -> Volume<f64> {
        self.kernel
    }

    /// Number of kernel refinements so far.
    #[inline]
    pub fn refinements(&self) -> usize {
        self.refinements
    }

    pub fn init(&mut self, measured: &Volume<f64>) {
        let roi = self.crop_peak(measured);
        self.measured_roi = Some(roi.map(|&v| v * v));
    }

    pub fn set_previous(&mut self, amplitude: &Volume<f64>) {
        self.previous = Some(self.crop_peak(amplitude));
    }

    /// Coherence-corrected modulus `sqrt(max(0, amplitude² ⊛ kernel))`.
    ///
    /// With `refine`, the kernel is first re-estimated from the measured
    /// intensity and the extrapolated modeled intensity. The convolution
    /// runs on the centered spectrum so the zero-padding sits at the highest
    /// frequencies.
    pub fn apply(&mut self, amplitude: &Volume<f64>, refine: bool) -> Volume<f64> {
        if refine {
            self.refine(amplitude);
        }

        let intensity = amplitude.map(|&v| v * v).fftshift();
        let blurred = self.convolver.convolve_same(&intensity, &self.kernel);
        blurred.ifftshift().map(|&v| v.max(0.0).sqrt())
    }

    /// ROI around the zero frequency of a spectrum in DFT layout.
    fn crop_peak(&self, spectrum: &Volume<f64>) -> Volume<f64> {
        spectrum.fftshift().crop_center(self.roi)
    }

    fn refine(&mut self, amplitude: &Volume<f64>) {
        let Some(measured) = self.measured_roi.clone() else {
            tracing::warn!("Coherence refinement requested before init, skipping");
            return;
        };

        let current = self.crop_peak(amplitude);
        let mut psf = match &self.previous {
            Some(previous) => current.zip_map(previous, |&c, &p| {
                let extrapolated = 2.0 * c - p;
                extrapolated * extrapolated
            }),
            None => current.map(|&c| c * c),
        };

        if self.normalize {
            let target = math::sum(measured.data());
            let energy = math::sum(psf.data());
            if energy > 0.0 {
                let scale = target / energy;
                psf.iter_mut().for_each(|v| *v *= scale);
            }
        }

        self.kernel = match self.algorithm {
            PcdiAlgorithm::Lucy => self.deconv_lucy(&measured, &psf, self.iterations),
        };
        self.refinements += 1;
        tracing::debug!(
            refinements = self.refinements,
            iterations = self.iterations,
            "Coherence kernel refined"
        );
    }

    /// Richardson-Lucy deconvolution starting from the current kernel.
    /// Returns a kernel with unit L1 norm.
    pub fn deconv_lucy(
        &mut self,
        observed: &Volume<f64>,
        psf: &Volume<f64>,
        iterations: usize,
    ) -> Volume<f64> {
        assert!(observed.same_dims(&self.kernel), "observed dims mismatch");

        let mirrored = psf.mirrored();
        let mut estimate = self.kernel.clone();
        for _ in 0..iterations {
            let conv = self
                .convolver
                .convolve_same(&estimate, psf)
                .map(|&v| if v == 0.0 { 1.0 } else { v });
            let ratio = observed.zip_map(&conv, |&o, &c| o / c);
            let correction = self.convolver.convolve_same(&ratio, &mirrored);
            estimate
                .iter_mut()
                .zip(correction.iter())
                .for_each(|(e, &c)| *e *= c);
        }

        if self.clip {
            estimate.iter_mut().for_each(|v| *v = v.clamp(-1.0, 1.0));
        }
        estimate.iter_mut().for_each(|v| *v = v.abs());

        let norm = math::sum(estimate.data());
        if norm > 0.0 && norm.is_finite() {
            estimate.iter_mut().for_each(|v| *v /= norm);
            estimate
        } else {
            tracing::warn!(norm, "Degenerate coherence kernel, resetting to flat");
            flat_kernel(self.roi)
        }
    }

    pub fn release_scratch(&mut self) {
        self.convolver.release_scratch();
    }
}

/// Uniform kernel with unit L1 norm.
pub fn flat_kernel(roi: Dims) -> Volume<f64> {
    let count = roi.iter().product::<usize>() as f64;
    Volume::new_filled(roi, 1.0 / count)
}
