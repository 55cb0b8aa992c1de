//! On-disk reconstruction configuration.
//!
//! The file is a flat map using the established key vocabulary of CDI
//! reconstruction configs. Every key is optional except
//! `algorithm_sequence` and `support_area`; missing keys take the defaults
//! from [`ReconstructionConfig::default`]. Keys this crate does not know are
//! ignored so one file can drive other tools as well.
//!
//! ```yaml
//! algorithm_sequence:
//!   - [3, [ER, 20], [HIO, 180]]
//!   - [1, [ER, 20]]
//! amp_support_trigger: [[1, 1]]
//! support_area: [0.5, 0.5, 0.5]
//! pcdi_trigger: [[50, 50]]
//! partial_coherence_roi: [16, 16, 16]
//! twin_trigger: [[2]]
//! ```

use std::f64::consts::FRAC_PI_2;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithm::{AlgorithmId, DEFAULT_BETA};
use crate::error::ConfigError;

/// One element of an `algorithm_sequence` block.
///
/// A block is written `[repeat, [alg, iterations], [alg, iterations], ...]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceItem {
    Repeat(usize),
    Step(AlgorithmId, usize),
}

/// Raw trigger setting: `[index]`, `[start, step]` or `[start, step, stop]`.
///
/// Negative values count back from the total iteration count; `stop` is
/// exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerSetting(pub Vec<i64>);

impl TriggerSetting {
    pub fn at(index: i64) -> Self {
        Self(vec![index])
    }

    pub fn every(start: i64, step: i64) -> Self {
        Self(vec![start, step])
    }

    pub fn range(start: i64, step: i64, stop: i64) -> Self {
        Self(vec![start, step, stop])
    }
}

/// Box extent along one axis: an absolute voxel count or a fraction of the
/// grid dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Extent {
    Voxels(usize),
    Fraction(f64),
}

impl Extent {
    /// Resolves against a grid dimension, clamped to `1..=dim`.
    pub fn resolve(self, dim: usize) -> usize {
        let voxels = match self {
            Self::Voxels(n) => n,
            Self::Fraction(f) => (f * dim as f64).round() as usize,
        };
        voxels.clamp(1, dim.max(1))
    }

    fn value(self) -> f64 {
        match self {
            Self::Voxels(n) => n as f64,
            Self::Fraction(f) => f,
        }
    }

    /// Validates a three-entry extent list.
    pub(crate) fn check(name: &'static str, extents: &[Extent]) -> Result<(), ConfigError> {
        if extents.len() != 3 {
            return Err(ConfigError::WrongLength {
                name,
                expected: 3,
                actual: extents.len(),
            });
        }
        for (index, extent) in extents.iter().enumerate() {
            let value = extent.value();
            if value <= 0.0 || !value.is_finite() {
                return Err(ConfigError::NonPositiveExtent { name, index, value });
            }
        }
        Ok(())
    }
}

/// Deconvolution method used to refine the coherence kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PcdiAlgorithm {
    /// Richardson-Lucy.
    #[default]
    Lucy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub algorithm_sequence: Vec<Vec<SequenceItem>>,
    pub beta: f64,

    pub amp_threshold: f64,
    pub amp_threshold_fill_zeros: bool,

    pub amp_support_trigger: Vec<TriggerSetting>,
    pub support_area: Vec<Extent>,
    pub support_threshold: f64,
    pub support_sigma: f64,
    /// Lowers the shrink-wrap threshold while the support covers less than
    /// this fraction of the grid.
    pub support_min_fraction: Option<f64>,

    pub phase_support_trigger: Vec<TriggerSetting>,
    pub phase_min: f64,
    pub phase_max: f64,

    pub pcdi_trigger: Vec<TriggerSetting>,
    pub partial_coherence_type: PcdiAlgorithm,
    pub partial_coherence_roi: Vec<Extent>,
    pub partial_coherence_normalize: bool,
    pub partial_coherence_iteration_num: usize,
    pub partial_coherence_clip: bool,

    pub resolution_trigger: Vec<TriggerSetting>,
    /// `[first, last]` support sigma over the low-resolution iterations.
    pub iter_res_sigma_range: Vec<f64>,
    /// `[first, last]` detector fraction over the low-resolution iterations.
    pub iter_res_det_range: Vec<f64>,

    pub twin_trigger: Vec<TriggerSetting>,
    pub avg_iterations: usize,
    pub garbage_trigger: Vec<TriggerSetting>,

    /// Seed for the random initial guess.
    pub seed: Option<u64>,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            algorithm_sequence: Vec::new(),
            beta: DEFAULT_BETA,
            amp_threshold: 0.0,
            amp_threshold_fill_zeros: false,
            amp_support_trigger: Vec::new(),
            support_area: Vec::new(),
            support_threshold: 0.1,
            support_sigma: 1.0,
            support_min_fraction: None,
            phase_support_trigger: Vec::new(),
            phase_min: -FRAC_PI_2,
            phase_max: FRAC_PI_2,
            pcdi_trigger: Vec::new(),
            partial_coherence_type: PcdiAlgorithm::Lucy,
            partial_coherence_roi: Vec::new(),
            partial_coherence_normalize: true,
            partial_coherence_iteration_num: 20,
            partial_coherence_clip: false,
            resolution_trigger: Vec::new(),
            iter_res_sigma_range: Vec::new(),
            iter_res_det_range: Vec::new(),
            twin_trigger: Vec::new(),
            avg_iterations: 0,
            garbage_trigger: Vec::new(),
            seed: None,
        }
    }
}

impl ReconstructionConfig {
    /// Loads a YAML or JSON file, chosen by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = common::load_from_file(path)?;
        tracing::debug!(
            blocks = config.algorithm_sequence.len(),
            "Loaded reconstruction config"
        );
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(common::deserialize(text, common::FileFormat::Yaml)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(common::deserialize(text, common::FileFormat::Json)?)
    }
}
