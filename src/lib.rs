//! Episodic evaluation of few-shot classifiers
//!
//! This crate measures how well a gradient-adapted classifier learns new
//! classes from a handful of examples. It repeatedly samples N-way K-shot
//! episodes from a labelled dataset, adapts a fresh clone of the learner on each
//! episode's support rows, scores it on the query rows and summarises the run
//! with confidence intervals.

pub mod error;
pub mod config;
pub mod machine_learning;
pub mod episodic;
pub mod adaptation;
pub mod metrics;

pub use error::{EpisodeError, Result};

// Create a prelude module for convenient imports
pub mod prelude {
    pub use crate::adaptation::{
        fast_adapt, AdaptableLearner, AnyLearner, EpisodeResult, EpisodeRunner, Maml, MetaSgd,
        MetaWrapping, RunOutcome, RunSummary, META_SGD_INITIAL_RATE,
    };
    pub use crate::config::{DatasetName, EvaluationConfig, PhaseConfig};
    pub use crate::episodic::{Episode, EpisodeShape, EpisodicSampler, IndexPartition, TaskBudget};
    pub use crate::error::{EpisodeError, Result};
    pub use crate::machine_learning::prelude::*;
    pub use crate::metrics::{accuracy, confidence_interval, ConfidenceLevel, ConfidenceReport};
}

// Version and crate information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
