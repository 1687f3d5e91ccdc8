//! Crate-level error type for the episodic evaluation protocol

use thiserror::Error;

use crate::machine_learning::core::ModelError;
use crate::machine_learning::dataset::DatasetError;

/// Errors raised while configuring, sampling, adapting or summarising episodes.
///
/// None of these are transient: each one means a run cannot proceed and is
/// propagated to the caller unchanged.
#[derive(Debug, Error)]
pub enum EpisodeError {
    /// A non-positive or otherwise unusable configuration value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Not enough classes hold `shot + query` examples to draw a `way`-way episode
    #[error(
        "insufficient class samples: {required} classes with at least {min_examples} \
         examples are required, only {available} qualify"
    )]
    InsufficientClassSamples {
        required: usize,
        available: usize,
        min_examples: usize,
    },

    /// An index set points past the end of an episode
    #[error("index {index} out of range for episode of {len} examples")]
    IndexOutOfRange { index: usize, len: usize },

    /// Too few values to estimate a standard deviation
    #[error("insufficient samples: need at least {required} values, got {actual}")]
    InsufficientSamples { required: usize, actual: usize },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, EpisodeError>;
