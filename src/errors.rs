//! Error taxonomy for the DMC kernel.
//!
//! Every failure is surfaced to the caller of construction or `propagate`;
//! nothing is retried internally. A `PopulationCollapse` is a simulation
//! validity failure (bad timestep or feedback), not a software bug, and is
//! kept distinct from potential-evaluation failures for that reason.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DmcError>;

#[derive(Debug, Error)]
pub enum DmcError {
    /// Malformed construction input (mismatched lengths, unknown atoms, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Unsupported combination of run options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The wrapped potential failed or returned malformed output.
    #[error("potential evaluation failed (walker {walker:?}): {reason}")]
    PotentialEvaluation {
        walker: Option<usize>,
        reason: String,
    },

    /// Every walker weight reached zero, leaving an empty ensemble.
    #[error("walker population collapsed at step {step}")]
    PopulationCollapse { step: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

impl DmcError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DmcError::Validation(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        DmcError::Configuration(msg.into())
    }
}
