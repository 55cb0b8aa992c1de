//! Validated reconstruction parameters.
//!
//! [`Params`] is what the reconstruction consumes: every trigger is already
//! resolved into sorted iteration indices and every extent into voxels. It
//! can be built directly or derived from a [`ReconstructionConfig`].

use std::f64::consts::FRAC_PI_2;

use crate::algorithm::{AlgorithmId, DEFAULT_BETA};
use crate::config::{Extent, PcdiAlgorithm, ReconstructionConfig, SequenceItem, TriggerSetting};
use crate::error::ConfigError;
use crate::math::fft_friendly_dim;
use crate::volume::Dims;

/// Default detector fraction ramp for low-resolution iterations.
pub const DEFAULT_DET_RANGE: (f64, f64) = (0.7, 1.0);

/// Default first support sigma for low-resolution iterations.
pub const DEFAULT_LOW_RES_SIGMA: f64 = 2.0;

/// Whether a run starts from scratch or continues an earlier result.
///
/// Continued runs skip behaviors that only make sense on a fresh start
/// (resolution ramp, phase constraint, twin suppression) and delay periodic
/// support and coherence updates by one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunKind {
    #[default]
    First,
    Continued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerKind {
    ForAllRuns,
    FirstRunOnly,
    ModifiedAfterFirst,
}

/// Algorithm `algorithm` runs for every iteration below `end` not claimed by
/// an earlier switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmSwitch {
    pub algorithm: AlgorithmId,
    pub end: usize,
}

impl AlgorithmSwitch {
    pub fn new(algorithm: AlgorithmId, end: usize) -> Self {
        Self { algorithm, end }
    }
}

/// Shrink-wrap support parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportParams {
    /// Initial support box, in voxels.
    pub area: Dims,
    /// Fraction of the smoothed maximum a voxel must reach to stay inside.
    pub threshold: f64,
    /// Gaussian blur width in voxels.
    pub sigma: f64,
    /// Minimum support coverage before the threshold is lowered.
    pub min_fraction: Option<f64>,
    pub triggers: Vec<usize>,
}

/// Phase constraint parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseParams {
    pub min: f64,
    pub max: f64,
    pub triggers: Vec<usize>,
}

impl Default for PhaseParams {
    fn default() -> Self {
        Self {
            min: -FRAC_PI_2,
            max: FRAC_PI_2,
            triggers: Vec::new(),
        }
    }
}

/// Partial coherence parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PcdiParams {
    pub algorithm: PcdiAlgorithm,
    /// Kernel extent, FFT-friendly and no larger than the grid.
    pub roi: Dims,
    pub normalize: bool,
    /// Richardson-Lucy rounds per kernel refinement.
    pub iterations: usize,
    pub clip: bool,
    pub triggers: Vec<usize>,
}

/// Low-resolution ramp parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionParams {
    /// Length of the sigma and detector ramps.
    pub iterations: usize,
    pub sigma_range: (f64, f64),
    pub det_range: (f64, f64),
    pub triggers: Vec<usize>,
}

/// Everything one reconstruction run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub dims: Dims,
    pub switches: Vec<AlgorithmSwitch>,
    pub beta: f64,
    pub amp_threshold: f64,
    pub amp_threshold_fill_zeros: bool,
    pub support: SupportParams,
    pub phase: Option<PhaseParams>,
    pub pcdi: Option<PcdiParams>,
    pub resolution: Option<ResolutionParams>,
    pub twin: Option<usize>,
    pub avg_iterations: usize,
    /// Iterations after which cached FFT scratch memory is released.
    pub gc_triggers: Vec<usize>,
    pub seed: Option<u64>,
}

impl Params {
    /// Parameters with a half-grid initial support and nothing else enabled.
    pub fn new(dims: Dims, switches: Vec<AlgorithmSwitch>) -> Self {
        Self {
            dims,
            switches,
            beta: DEFAULT_BETA,
            amp_threshold: 0.0,
            amp_threshold_fill_zeros: false,
            support: SupportParams {
                area: std::array::from_fn(|axis| (dims[axis] / 2).max(1)),
                threshold: 0.1,
                sigma: 1.0,
                min_fraction: None,
                triggers: Vec::new(),
            },
            phase: None,
            pcdi: None,
            resolution: None,
            twin: None,
            avg_iterations: 0,
            gc_triggers: Vec::new(),
            seed: None,
        }
    }

    /// Resolves a configuration against a grid.
    pub fn from_config(
        config: &ReconstructionConfig,
        dims: Dims,
        run: RunKind,
    ) -> Result<Self, ConfigError> {
        let switches = expand_algorithm_sequence(&config.algorithm_sequence)?;
        let total = switches.last().map_or(0, |s| s.end);
        let resolve = |name: &'static str, settings: &[TriggerSetting], kind: TriggerKind| {
            compact_triggers(name, settings, total, kind, run)
        };

        if config.support_area.is_empty() {
            return Err(ConfigError::MissingSetting("support_area"));
        }
        Extent::check("support_area", &config.support_area)?;
        let support = SupportParams {
            area: std::array::from_fn(|axis| config.support_area[axis].resolve(dims[axis])),
            threshold: config.support_threshold,
            sigma: config.support_sigma,
            min_fraction: config.support_min_fraction,
            triggers: resolve(
                "amp_support_trigger",
                &config.amp_support_trigger,
                TriggerKind::ModifiedAfterFirst,
            )?,
        };

        let phase_triggers = resolve(
            "phase_support_trigger",
            &config.phase_support_trigger,
            TriggerKind::FirstRunOnly,
        )?;
        let phase = (!phase_triggers.is_empty()).then(|| PhaseParams {
            min: config.phase_min,
            max: config.phase_max,
            triggers: phase_triggers,
        });

        let pcdi = if config.pcdi_trigger.is_empty() {
            None
        } else {
            if config.partial_coherence_roi.is_empty() {
                return Err(ConfigError::MissingSetting("partial_coherence_roi"));
            }
            Extent::check("partial_coherence_roi", &config.partial_coherence_roi)?;
            Some(PcdiParams {
                algorithm: config.partial_coherence_type,
                roi: std::array::from_fn(|axis| {
                    let roi = config.partial_coherence_roi[axis].resolve(dims[axis]);
                    fft_friendly_dim(roi).min(dims[axis])
                }),
                normalize: config.partial_coherence_normalize,
                iterations: config.partial_coherence_iteration_num,
                clip: config.partial_coherence_clip,
                triggers: resolve(
                    "pcdi_trigger",
                    &config.pcdi_trigger,
                    TriggerKind::ModifiedAfterFirst,
                )?,
            })
        };

        let resolution_triggers = resolve(
            "resolution_trigger",
            &config.resolution_trigger,
            TriggerKind::FirstRunOnly,
        )?;
        let resolution = (!resolution_triggers.is_empty()).then(|| {
            // the ramp spans up to the stop of the first setting
            let iterations = config
                .resolution_trigger
                .first()
                .and_then(|setting| setting.0.get(2))
                .map_or(total, |&stop| wrap_index(stop, total).clamp(1, total.max(1)));
            ResolutionParams {
                iterations,
                sigma_range: range_pair(
                    &config.iter_res_sigma_range,
                    (DEFAULT_LOW_RES_SIGMA, config.support_sigma),
                ),
                det_range: range_pair(&config.iter_res_det_range, DEFAULT_DET_RANGE),
                triggers: resolution_triggers,
            }
        });

        let twin = resolve(
            "twin_trigger",
            &config.twin_trigger,
            TriggerKind::FirstRunOnly,
        )?
        .first()
        .copied();

        let params = Self {
            dims,
            switches,
            beta: config.beta,
            amp_threshold: config.amp_threshold,
            amp_threshold_fill_zeros: config.amp_threshold_fill_zeros,
            support,
            phase,
            pcdi,
            resolution,
            twin,
            avg_iterations: config.avg_iterations,
            gc_triggers: resolve(
                "garbage_trigger",
                &config.garbage_trigger,
                TriggerKind::ForAllRuns,
            )?,
            seed: config.seed,
        };
        tracing::debug!(
            iterations = params.iteration_count(),
            switches = params.switches.len(),
            ?run,
            "Resolved reconstruction parameters"
        );
        Ok(params)
    }

    /// Total number of iterations, the end of the last switch.
    pub fn iteration_count(&self) -> usize {
        self.switches.last().map_or(0, |s| s.end)
    }

    /// Panics with a descriptive message on inconsistent parameters.
    pub fn validate(&self) {
        assert!(
            self.dims.iter().all(|&d| d > 0),
            "Grid dims must be positive, got {:?}",
            self.dims
        );
        assert!(
            !self.switches.is_empty(),
            "At least one algorithm switch is required"
        );
        assert!(
            self.switches[0].end > 0,
            "First algorithm switch must end after iteration 0"
        );
        for pair in self.switches.windows(2) {
            assert!(
                pair[0].end < pair[1].end,
                "Algorithm switch ends must strictly increase, got {} then {}",
                pair[0].end,
                pair[1].end
            );
        }
        assert!(
            self.beta.is_finite(),
            "beta must be finite, got {}",
            self.beta
        );
        assert!(
            self.amp_threshold >= 0.0,
            "amp_threshold must be non-negative, got {}",
            self.amp_threshold
        );

        let total = self.iteration_count();
        assert!(
            self.avg_iterations <= total,
            "avg_iterations ({}) exceeds the iteration count ({})",
            self.avg_iterations,
            total
        );

        let support = &self.support;
        for axis in 0..3 {
            assert!(
                support.area[axis] > 0 && support.area[axis] <= self.dims[axis],
                "Support area {:?} must fit the grid {:?}",
                support.area,
                self.dims
            );
        }
        assert!(
            (0.0..=1.0).contains(&support.threshold),
            "Support threshold must be in [0, 1], got {}",
            support.threshold
        );
        assert!(
            support.sigma > 0.0,
            "Support sigma must be positive, got {}",
            support.sigma
        );
        if let Some(fraction) = support.min_fraction {
            assert!(
                (0.0..=1.0).contains(&fraction),
                "Support min_fraction must be in [0, 1], got {}",
                fraction
            );
        }
        assert_sorted("support", &support.triggers);

        if let Some(phase) = &self.phase {
            assert!(
                phase.min < phase.max,
                "Phase range must be increasing, got [{}, {}]",
                phase.min,
                phase.max
            );
            assert_sorted("phase", &phase.triggers);
        }

        if let Some(pcdi) = &self.pcdi {
            for axis in 0..3 {
                assert!(
                    pcdi.roi[axis] > 0 && pcdi.roi[axis] <= self.dims[axis],
                    "Coherence ROI {:?} must fit the grid {:?}",
                    pcdi.roi,
                    self.dims
                );
            }
            assert_sorted("coherence", &pcdi.triggers);
        }

        if let Some(resolution) = &self.resolution {
            assert!(
                resolution.iterations > 0,
                "Low-resolution ramp must cover at least one iteration"
            );
            assert!(
                resolution.det_range.0 > 0.0 && resolution.det_range.1 > 0.0,
                "Detector range must be positive, got {:?}",
                resolution.det_range
            );
            assert_sorted("resolution", &resolution.triggers);
        }

        assert_sorted("garbage", &self.gc_triggers);
    }
}

fn assert_sorted(name: &str, triggers: &[usize]) {
    assert!(
        triggers.windows(2).all(|pair| pair[0] < pair[1]),
        "{} triggers must be sorted and unique, got {:?}",
        name,
        triggers
    );
}

fn range_pair(values: &[f64], default: (f64, f64)) -> (f64, f64) {
    match values {
        [] => default,
        [first] => (*first, default.1),
        [first, last, ..] => (*first, *last),
    }
}

fn wrap_index(value: i64, total: usize) -> usize {
    let total = total as i64;
    let wrapped = if value < 0 { value + total } else { value };
    wrapped.max(0) as usize
}

/// Expands `[repeat, [alg, iterations], ...]` blocks into switch points.
pub fn expand_algorithm_sequence(
    blocks: &[Vec<SequenceItem>],
) -> Result<Vec<AlgorithmSwitch>, ConfigError> {
    let mut switches = Vec::new();
    let mut end = 0;

    for (block_index, block) in blocks.iter().enumerate() {
        let (repeat, steps) = match block.split_first() {
            Some((SequenceItem::Repeat(repeat), steps)) => (*repeat, steps),
            _ => return Err(ConfigError::MissingRepeatCount { block: block_index }),
        };
        if steps.is_empty() {
            return Err(ConfigError::EmptySequenceBlock { block: block_index });
        }

        let mut resolved = Vec::with_capacity(steps.len());
        for (position, item) in steps.iter().enumerate() {
            match *item {
                SequenceItem::Repeat(_) => {
                    return Err(ConfigError::MisplacedRepeatCount {
                        block: block_index,
                        position: position + 1,
                    });
                }
                SequenceItem::Step(algorithm, 0) => {
                    return Err(ConfigError::ZeroIterations {
                        block: block_index,
                        algorithm: algorithm.to_string(),
                    });
                }
                SequenceItem::Step(algorithm, iterations) => resolved.push((algorithm, iterations)),
            }
        }

        for _ in 0..repeat {
            for &(algorithm, iterations) in &resolved {
                end += iterations;
                switches.push(AlgorithmSwitch::new(algorithm, end));
            }
        }
    }

    if switches.is_empty() {
        return Err(ConfigError::EmptyAlgorithmSequence);
    }
    Ok(switches)
}

/// Resolves trigger settings into sorted, unique iteration indices below
/// `total`.
fn compact_triggers(
    name: &'static str,
    settings: &[TriggerSetting],
    total: usize,
    kind: TriggerKind,
    run: RunKind,
) -> Result<Vec<usize>, ConfigError> {
    if run == RunKind::Continued && kind == TriggerKind::FirstRunOnly {
        return Ok(Vec::new());
    }

    let invalid = |setting: &TriggerSetting| ConfigError::InvalidTrigger {
        name,
        setting: setting.0.clone(),
    };

    let mut iterations = Vec::new();
    for setting in settings {
        match setting.0.as_slice() {
            &[index] => {
                let index = wrap_index(index, total);
                if index < total {
                    iterations.push(index);
                }
            }
            &[start, step] | &[start, step, _] => {
                if step <= 0 {
                    return Err(invalid(setting));
                }
                let start = if run == RunKind::Continued && kind == TriggerKind::ModifiedAfterFirst
                {
                    step as usize
                } else {
                    wrap_index(start, total)
                };
                let stop = setting
                    .0
                    .get(2)
                    .map_or(total, |&stop| wrap_index(stop, total).min(total));
                iterations.extend((start..stop).step_by(step as usize));
            }
            _ => return Err(invalid(setting)),
        }
    }

    iterations.sort_unstable();
    iterations.dedup();
    Ok(iterations)
}

#[cfg(test)]
mod tests;
