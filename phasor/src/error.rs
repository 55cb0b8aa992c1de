//! Error types for configuration loading and reconstruction setup.

use thiserror::Error;

use crate::volume::Dims;

/// Errors raised while turning a configuration file into a parameter set.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Format(#[from] common::FormatError),

    #[error("Algorithm sequence is empty")]
    EmptyAlgorithmSequence,

    #[error("Algorithm sequence block {block} must start with a repeat count")]
    MissingRepeatCount { block: usize },

    #[error("Algorithm sequence block {block} has a repeat count in position {position}")]
    MisplacedRepeatCount { block: usize, position: usize },

    #[error("Algorithm sequence block {block} has no algorithm steps")]
    EmptySequenceBlock { block: usize },

    #[error("Algorithm {algorithm} in block {block} runs zero iterations")]
    ZeroIterations { block: usize, algorithm: String },

    #[error("Invalid trigger '{name}': {setting:?}")]
    InvalidTrigger {
        name: &'static str,
        setting: Vec<i64>,
    },

    #[error("Missing required setting '{0}'")]
    MissingSetting(&'static str),

    #[error("Setting '{name}' needs {expected} entries, got {actual}")]
    WrongLength {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Setting '{name}' entry {index} must be positive, got {value}")]
    NonPositiveExtent {
        name: &'static str,
        index: usize,
        value: f64,
    },
}

/// Errors raised while preparing a reconstruction.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Reconstruction grid is empty: {0:?}")]
    EmptyGrid(Dims),

    #[error("Dimension mismatch for {what}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: Dims,
        actual: Dims,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
