//! Real-space constraints (ER, HIO and their normalized siblings) and the
//! reciprocal-space modulus projection shared by all of them.

use rayon::prelude::*;
use rustfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::fft::Fft3;
use crate::math::{self, AMPLITUDE_EPSILON};
use crate::volume::{Dims, Volume};

/// Default HIO feedback coefficient.
pub const DEFAULT_BETA: f64 = 0.9;

/// Reconstruction algorithm variant.
#[derive(
    Debug,
    Display,
    EnumIter,
    EnumString,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AlgorithmId {
    /// Error reduction: zero everything outside the support.
    Er,
    /// Hybrid input-output: negative feedback outside the support.
    Hio,
    /// Error reduction, energy-preserving.
    ErNorm,
    /// Hybrid input-output, energy-preserving.
    HioNorm,
}

impl AlgorithmId {
    #[inline]
    pub fn is_normalized(self) -> bool {
        matches!(self, Self::ErNorm | Self::HioNorm)
    }

    /// Applies the real-space constraint to `raw`, the inverse transform of
    /// the modulus-replaced field. `previous` is the image before this
    /// iteration's modulus projection.
    pub fn apply_constraint(
        self,
        raw: &Volume<Complex64>,
        previous: &Volume<Complex64>,
        support: &Volume<bool>,
        beta: f64,
    ) -> Volume<Complex64> {
        assert!(raw.same_dims(support), "support dims mismatch");
        assert!(raw.same_dims(previous), "previous image dims mismatch");

        let mut image = match self {
            Self::Er | Self::ErNorm => {
                raw.zip_map(support, |&r, &inside| if inside { r } else { Complex64::default() })
            }
            Self::Hio | Self::HioNorm => {
                let mut image = raw.clone();
                image
                    .data_mut()
                    .par_iter_mut()
                    .zip(previous.data().par_iter())
                    .zip(support.data().par_iter())
                    .for_each(|((v, &p), &inside)| {
                        if !inside {
                            *v = p - *v * beta;
                        }
                    });
                image
            }
        };

        if self.is_normalized() {
            let target: f64 = raw
                .data()
                .iter()
                .zip(support.data())
                .filter(|&(_, &inside)| inside)
                .map(|(v, _)| v.norm_sqr())
                .sum();
            let current = math::energy(image.data());
            if current > 0.0 {
                let scale = (target / current).sqrt();
                image.iter_mut().for_each(|v| *v *= scale);
            }
        }

        image
    }
}

// ============================================================================
// Modulus projection
// ============================================================================

/// Forward/inverse transforms plus the measured-amplitude replacement rule.
#[derive(Debug)]
pub struct ModulusProjector {
    fft: Fft3,
    amp_threshold: f64,
    fill_zeros: bool,
}

impl ModulusProjector {
    pub fn new(dims: Dims, amp_threshold: f64, fill_zeros: bool) -> Self {
        Self {
            fft: Fft3::new(dims),
            amp_threshold,
            fill_zeros,
        }
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        self.fft.dims()
    }

    /// Forward transform of `image`.
    pub fn to_reciprocal(&mut self, image: &Volume<Complex64>) -> Volume<Complex64> {
        let mut field = image.clone();
        self.fft.forward(&mut field);
        field
    }

    /// Replaces the modulus of `field` with `measured` and transforms back.
    ///
    /// `amplitude` is the modulus estimate the field is divided by; it is
    /// `|field|` for coherent data and the coherence-corrected modulus
    /// otherwise.
    pub fn project(
        &mut self,
        mut field: Volume<Complex64>,
        amplitude: &Volume<f64>,
        measured: &Volume<f64>,
    ) -> Volume<Complex64> {
        replace_modulus(
            &mut field,
            amplitude,
            measured,
            self.amp_threshold,
            self.fill_zeros,
        );
        self.fft.inverse(&mut field);
        field
    }

    pub fn release_scratch(&mut self) {
        self.fft.release_scratch();
    }
}

/// `Σ(amplitude − measured)² / Σ measured²`; zero when nothing was measured.
pub fn residual_error(amplitude: &Volume<f64>, measured: &Volume<f64>) -> f64 {
    assert!(amplitude.same_dims(measured), "measured dims mismatch");

    let diff: f64 = amplitude
        .data()
        .iter()
        .zip(measured.data())
        .map(|(a, m)| (a - m) * (a - m))
        .sum();
    let norm = math::energy_real(measured.data());
    if norm > 0.0 {
        diff / norm
    } else {
        diff
    }
}

/// Scales `field` to `measured` wherever `measured > threshold`, keeping the
/// phase. Other voxels are kept, or zeroed when `fill_zeros` is set.
pub fn replace_modulus(
    field: &mut Volume<Complex64>,
    amplitude: &Volume<f64>,
    measured: &Volume<f64>,
    threshold: f64,
    fill_zeros: bool,
) {
    assert!(field.same_dims(amplitude), "amplitude dims mismatch");
    assert!(field.same_dims(measured), "measured dims mismatch");

    field
        .data_mut()
        .par_iter_mut()
        .zip(amplitude.data().par_iter())
        .zip(measured.data().par_iter())
        .for_each(|((v, &a), &m)| {
            if m > threshold {
                let a = if a == 0.0 { AMPLITUDE_EPSILON } else { a };
                *v *= m / a;
            } else if fill_zeros {
                *v = Complex64::default();
            }
        });
}
