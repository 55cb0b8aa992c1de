//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use phasor::prelude::*;
//! ```

// Grid types
pub use crate::{Complex64, Dims, Volume};

// Configuration
pub use crate::{AlgorithmId, AlgorithmSwitch, ConfigError, Error, Params, ReconstructionConfig, RunKind};

// Reconstruction - main API
pub use crate::{
    random_guess, IterationProgress, Reconstruction, ReconstructionResult, ResumeState,
    RunControl, StopFile, StopFlag,
};
