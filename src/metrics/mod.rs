//! Per-episode accuracy and run-level confidence intervals

pub mod accuracy;
pub mod confidence;

pub use accuracy::{accuracy, accuracy_from_predictions, argmax_rows};
pub use confidence::{
    confidence_interval, confidence_interval_at, mean, sample_std_dev, ConfidenceLevel,
    ConfidenceReport,
};
