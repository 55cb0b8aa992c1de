//! Phasor - iterative phase retrieval for coherent diffraction imaging.
//!
//! Given the measured diffraction amplitude of an object and an initial
//! guess of its complex image, the reconstruction alternates between a
//! reciprocal-space modulus constraint and a real-space support constraint
//! (error reduction or hybrid input-output). Along the way it can:
//! - shrink-wrap the support from the current image amplitude
//! - constrain the image phase
//! - correct for partial coherence with a Richardson-Lucy kernel estimate
//! - ramp the data resolution during early iterations
//! - suppress the twin image and average the final iterations
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use phasor::prelude::*;
//!
//! let config = ReconstructionConfig::load("config.yaml")?;
//! let reconstruction =
//!     Reconstruction::from_config(data, &config, RunKind::First, ResumeState::default())?;
//! let result = reconstruction.run();
//!
//! println!("final error {:?}", result.errors.last());
//! ```

mod algorithm;
mod config;
mod error;
mod fft;
mod guess;
mod math;
mod params;
mod pcdi;
mod reconstruction;
mod resolution;
mod schedule;
mod state;
mod support;
mod volume;

pub mod prelude;

pub use rustfft::num_complex::Complex64;

// ============================================================================
// Grid storage and transforms
// ============================================================================

pub use fft::{fft_convolve_same, Fft3, FftConvolver};
pub use math::{fft_friendly_dim, gaussian_centered, magnitude};
pub use volume::{centered_offset, voxel_count, Dims, Volume};

// ============================================================================
// Configuration
// ============================================================================

pub use config::{Extent, PcdiAlgorithm, ReconstructionConfig, SequenceItem, TriggerSetting};
pub use error::{ConfigError, Error, Result};
pub use params::{
    expand_algorithm_sequence, AlgorithmSwitch, Params, PcdiParams, PhaseParams,
    ResolutionParams, RunKind, SupportParams,
};

// ============================================================================
// Iteration control
// ============================================================================

pub use schedule::TriggerSchedule;
pub use state::{IterationFacts, IterationState};

// ============================================================================
// Estimators
// ============================================================================

pub use algorithm::{residual_error, replace_modulus, AlgorithmId, ModulusProjector, DEFAULT_BETA};
pub use pcdi::{flat_kernel, PartialCoherence};
pub use resolution::Resolution;
pub use support::{initial_mask, Support};

// ============================================================================
// Reconstruction
// ============================================================================

pub use guess::random_guess;
pub use reconstruction::{
    IterationProgress, ProgressCallback, Reconstruction, ReconstructionResult, ResumeState,
    RunControl, StepOutcome, StopFile, StopFlag, StopSignal,
};
