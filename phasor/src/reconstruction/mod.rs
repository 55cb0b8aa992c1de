//! The reconstruction loop.
//!
//! A [`Reconstruction`] owns every piece of per-run state: the image
//! estimate, the iteration state machine, the support and coherence
//! estimators and the error history. [`Reconstruction::run`] drives it to
//! completion; [`Reconstruction::step`] runs a single iteration.

mod control;

use std::borrow::Cow;

use rustfft::num_complex::Complex64;

use crate::algorithm::{residual_error, ModulusProjector};
use crate::config::ReconstructionConfig;
use crate::error::{Error, Result};
use crate::guess::random_guess;
use crate::math;
use crate::params::{Params, RunKind};
use crate::pcdi::PartialCoherence;
use crate::resolution::Resolution;
use crate::state::{IterationFacts, IterationState};
use crate::support::Support;
use crate::volume::{voxel_count, Dims, Volume};

pub use control::{
    IterationProgress, ProgressCallback, RunControl, StopFile, StopFlag, StopSignal,
};

/// Output of a run.
#[derive(Debug, Clone)]
pub struct ReconstructionResult {
    /// Final image, zero outside the final support.
    pub image: Volume<Complex64>,
    /// Final support as 0/1 values.
    pub support: Volume<f64>,
    /// Coherence kernel, when partial coherence was configured.
    pub coherence: Option<Volume<f64>>,
    /// Residual error of every executed iteration.
    pub errors: Vec<f64>,
    pub iterations_run: usize,
    /// Whether a stop signal ended the run before the last iteration.
    pub stopped_early: bool,
}

/// State carried over from an earlier run.
#[derive(Debug, Clone, Default)]
pub struct ResumeState {
    pub support: Option<Volume<bool>>,
    pub coherence: Option<Volume<f64>>,
}

/// Result of a single [`Reconstruction::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Finished,
    Stopped,
}

/// Running per-voxel sum of image magnitudes.
#[derive(Debug, Default)]
struct Averager {
    sum: Option<Volume<f64>>,
    count: usize,
}

impl Averager {
    fn accumulate(&mut self, image: &Volume<Complex64>) {
        let magnitude = math::magnitude(image);
        match &mut self.sum {
            Some(sum) => sum
                .iter_mut()
                .zip(magnitude.iter())
                .for_each(|(s, &m)| *s += m),
            None => self.sum = Some(magnitude),
        }
        self.count += 1;
    }

    fn mean(&self) -> Option<Volume<f64>> {
        let sum = self.sum.as_ref()?;
        let count = self.count as f64;
        Some(sum.map(|&s| s / count))
    }
}

#[derive(Debug)]
pub struct Reconstruction {
    params: Params,
    data: Volume<f64>,
    image: Volume<Complex64>,
    state: IterationState,
    projector: ModulusProjector,
    support: Support,
    coherence: Option<PartialCoherence>,
    kernel_supplied: bool,
    resolution: Option<Resolution>,
    averager: Averager,
    errors: Vec<f64>,
    control: RunControl,
    stopped: bool,
}

impl Reconstruction {
    /// Fresh run from `guess`.
    pub fn new(data: Volume<f64>, guess: Volume<Complex64>, params: Params) -> Result<Self> {
        Self::resume(data, guess, params, ResumeState::default())
    }

    /// Builds parameters from `config` for the grid of `data` and starts
    /// from a random guess seeded with the configured seed.
    pub fn from_config(
        data: Volume<f64>,
        config: &ReconstructionConfig,
        run: RunKind,
        resume: ResumeState,
    ) -> Result<Self> {
        check_grid(data.dims())?;
        let params = Params::from_config(config, data.dims(), run)?;
        let guess = random_guess(data.dims(), params.seed);
        Self::resume(data, guess, params, resume)
    }

    /// Run that may start from an earlier support and coherence kernel.
    ///
    /// A supplied kernel engages the coherence correction from the first
    /// iteration; otherwise it engages at the first coherence trigger.
    pub fn resume(
        data: Volume<f64>,
        guess: Volume<Complex64>,
        params: Params,
        resume: ResumeState,
    ) -> Result<Self> {
        check_grid(params.dims)?;
        params.validate();
        check_dims("measured data", params.dims, data.dims())?;
        check_dims("initial guess", params.dims, guess.dims())?;

        let phase = params.phase.as_ref();
        let support = match resume.support {
            Some(mask) => {
                check_dims("support", params.dims, mask.dims())?;
                Support::with_mask(mask, &params.support, phase)
            }
            None => Support::new(params.dims, &params.support, phase),
        };

        let data = data.map(|v| v.abs());
        let kernel_supplied = resume.coherence.is_some();
        let coherence = match &params.pcdi {
            Some(pcdi) => {
                let mut coherence = PartialCoherence::new(pcdi, resume.coherence)?;
                coherence.init(&data);
                Some(coherence)
            }
            None => None,
        };

        let image = guess.zip_map(support.mask(), |&g, &inside| {
            if inside {
                g
            } else {
                Complex64::default()
            }
        });

        tracing::info!(
            dims = ?params.dims,
            iterations = params.iteration_count(),
            support_voxels = support.voxel_count(),
            coherence = coherence.is_some(),
            "Reconstruction initialized"
        );

        Ok(Self {
            state: IterationState::new(&params),
            projector: ModulusProjector::new(
                params.dims,
                params.amp_threshold,
                params.amp_threshold_fill_zeros,
            ),
            resolution: params.resolution.as_ref().map(Resolution::new),
            data,
            image,
            support,
            coherence,
            kernel_supplied,
            averager: Averager::default(),
            errors: Vec::new(),
            control: RunControl::default(),
            stopped: false,
            params,
        })
    }

    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    #[inline]
    pub fn params(&self) -> &Params {
        &self.params
    }

    #[inline]
    pub fn image(&self) -> &Volume<Complex64> {
        &self.image
    }

    #[inline]
    pub fn support(&self) -> &Support {
        &self.support
    }

    #[inline]
    pub fn coherence(&self) -> Option<&PartialCoherence> {
        self.coherence.as_ref()
    }

    #[inline]
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    /// Facts of the latest iteration.
    #[inline]
    pub fn facts(&self) -> Option<&IterationFacts> {
        self.state.facts()
    }

    /// Mask the constraint of the latest iteration used.
    pub fn constraint_mask(&self) -> Cow<'_, Volume<bool>> {
        let twin = self.state.facts().is_some_and(|f| f.twin);
        constraint_mask(&self.support, twin)
    }

    /// Runs all remaining iterations, or until a stop signal.
    pub fn run(mut self) -> ReconstructionResult {
        while self.step() == StepOutcome::Continue {}
        self.finish()
    }

    /// Runs one iteration.
    pub fn step(&mut self) -> StepOutcome {
        if self.stopped {
            return StepOutcome::Stopped;
        }
        if !self.state.advance() {
            return StepOutcome::Finished;
        }
        if self.control.should_stop() {
            self.stopped = true;
            tracing::info!(
                iterations_run = self.errors.len(),
                "Stop requested, ending reconstruction"
            );
            return StepOutcome::Stopped;
        }
        let Some(facts) = self.state.facts().copied() else {
            return StepOutcome::Finished;
        };
        let iteration = facts.iteration;

        let low_resolution = self.resolution.as_ref().filter(|_| facts.low_resolution);
        let data = match low_resolution {
            Some(resolution) => Cow::Owned(resolution.filter_data(&self.data, iteration)),
            None => Cow::Borrowed(&self.data),
        };

        let field = self.projector.to_reciprocal(&self.image);
        let magnitude = math::magnitude(&field);

        let engaged = self.kernel_supplied || self.state.coherence_started();
        let corrected = match self.coherence.as_mut() {
            Some(coherence) => {
                let corrected =
                    engaged.then(|| coherence.apply(&magnitude, facts.update_coherence));
                coherence.set_previous(&magnitude);
                corrected
            }
            None => None,
        };
        let amplitude = corrected.unwrap_or(magnitude);

        let error = residual_error(&amplitude, &data);
        self.errors.push(error);

        let raw = self.projector.project(field, &amplitude, &data);
        let image = {
            let mask = constraint_mask(&self.support, facts.twin);
            facts
                .algorithm
                .apply_constraint(&raw, &self.image, &mask, self.params.beta)
        };
        self.image = image;

        if facts.update_support {
            let sigma = low_resolution.map_or(self.params.support.sigma, |r| r.sigma_at(iteration));
            self.support.update_amplitude(&self.image, sigma);
        }
        if facts.update_phase {
            self.support.update_phase(&self.image);
        }
        if facts.averaging {
            self.averager.accumulate(&self.image);
        }
        if facts.release_scratch {
            self.release_scratch();
        }

        tracing::debug!(
            iteration,
            algorithm = %facts.algorithm,
            error,
            "Iteration finished"
        );
        self.control.report(&IterationProgress {
            iteration,
            total: self.state.total(),
            error,
            algorithm: facts.algorithm,
        });

        StepOutcome::Continue
    }

    /// Applies averaging and the final support and returns the outputs.
    pub fn finish(self) -> ReconstructionResult {
        let mut image = self.image;
        if let Some(mean) = self.averager.mean() {
            let scale = math::ratio(&mean, &math::magnitude(&image));
            image
                .iter_mut()
                .zip(scale.iter())
                .for_each(|(v, &s)| *v *= s);
        }

        let image = image.zip_map(self.support.mask(), |&v, &inside| {
            if inside {
                v
            } else {
                Complex64::default()
            }
        });

        tracing::info!(
            iterations_run = self.errors.len(),
            final_error = self.errors.last().copied().unwrap_or(f64::NAN),
            averaged = self.averager.count,
            stopped_early = self.stopped,
            "Reconstruction finished"
        );

        ReconstructionResult {
            image,
            support: self.support.to_numeric(),
            coherence: self.coherence.map(PartialCoherence::into_kernel),
            iterations_run: self.errors.len(),
            errors: self.errors,
            stopped_early: self.stopped,
        }
    }

    fn release_scratch(&mut self) {
        self.projector.release_scratch();
        self.support.release_scratch();
        if let Some(coherence) = &mut self.coherence {
            coherence.release_scratch();
        }
        tracing::debug!("Released FFT scratch buffers");
    }
}

fn constraint_mask(support: &Support, twin: bool) -> Cow<'_, Volume<bool>> {
    if twin {
        Cow::Owned(support.twin_suppressed())
    } else {
        Cow::Borrowed(support.mask())
    }
}

fn check_grid(dims: Dims) -> Result<()> {
    if voxel_count(dims) == 0 {
        return Err(Error::EmptyGrid(dims));
    }
    Ok(())
}

fn check_dims(what: &'static str, expected: Dims, actual: Dims) -> Result<()> {
    if expected != actual {
        return Err(Error::DimensionMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
