//! Normal-approximation confidence intervals over per-episode results

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{EpisodeError, Result};

/// A two-tailed confidence level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Ninety,
    NinetyFive,
    NinetyNine,
    /// Any level strictly between 0 and 1, e.g. `0.8`
    Custom(f64),
}

impl ConfidenceLevel {
    /// The levels reported at the end of every run
    pub const REPORTED: [ConfidenceLevel; 2] = [ConfidenceLevel::Ninety, ConfidenceLevel::NinetyFive];

    pub fn fraction(&self) -> f64 {
        match self {
            ConfidenceLevel::Ninety => 0.90,
            ConfidenceLevel::NinetyFive => 0.95,
            ConfidenceLevel::NinetyNine => 0.99,
            ConfidenceLevel::Custom(p) => *p,
        }
    }

    /// Two-tailed standard normal critical value
    pub fn z_score(&self) -> Result<f64> {
        match self {
            ConfidenceLevel::Ninety => Ok(1.645),
            ConfidenceLevel::NinetyFive => Ok(1.960),
            ConfidenceLevel::NinetyNine => Ok(2.576),
            ConfidenceLevel::Custom(p) => {
                if !(*p > 0.0 && *p < 1.0) {
                    return Err(EpisodeError::InvalidConfig(format!(
                        "confidence level must lie in (0, 1), got {}",
                        p
                    )));
                }
                let standard = Normal::new(0.0, 1.0)
                    .map_err(|e| EpisodeError::InvalidConfig(e.to_string()))?;
                Ok(standard.inverse_cdf(1.0 - (1.0 - p) / 2.0))
            }
        }
    }

    /// Report key such as `"95%"`
    pub fn label(&self) -> String {
        let percent = (self.fraction() * 1000.0).round() / 10.0;
        format!("{}%", percent)
    }
}

/// Mean, spread and interval half-widths of a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub mean: f64,
    /// Bessel-corrected sample standard deviation
    pub std_dev: f64,
    pub n: usize,
    /// Half-width keyed by level label
    pub half_widths: BTreeMap<String, f64>,
}

impl ConfidenceReport {
    pub fn half_width(&self, level: ConfidenceLevel) -> Option<f64> {
        self.half_widths.get(&level.label()).copied()
    }

    /// `(mean - h, mean + h)` for a computed level
    pub fn interval(&self, level: ConfidenceLevel) -> Option<(f64, f64)> {
        self.half_width(level).map(|h| (self.mean - h, self.mean + h))
    }
}

/// Arithmetic mean, accumulated relative to the first value.
///
/// A constant sample returns that value exactly.
pub fn mean(values: &[f64]) -> f64 {
    match values.first() {
        Some(&shift) => shift + mean_offset(values, shift),
        None => 0.0,
    }
}

fn mean_offset(values: &[f64], shift: f64) -> f64 {
    values.iter().map(|x| x - shift).sum::<f64>() / values.len() as f64
}

/// Sample standard deviation with Bessel's correction
pub fn sample_std_dev(values: &[f64]) -> Result<f64> {
    if values.len() < 2 {
        return Err(EpisodeError::InsufficientSamples {
            required: 2,
            actual: values.len(),
        });
    }

    // Deviations are taken from the first value, so identical values give exactly zero
    let shift = values[0];
    let m = mean_offset(values, shift);
    let variance = values
        .iter()
        .map(|x| (x - shift - m).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    Ok(variance.sqrt())
}

/// Half-widths at the reported 90% and 95% levels
pub fn confidence_interval(values: &[f64]) -> Result<ConfidenceReport> {
    confidence_interval_at(values, &ConfidenceLevel::REPORTED)
}

/// Half-width `z * s / sqrt(n)` at each requested level
pub fn confidence_interval_at(values: &[f64], levels: &[ConfidenceLevel]) -> Result<ConfidenceReport> {
    let std_dev = sample_std_dev(values)?;
    let standard_error = std_dev / (values.len() as f64).sqrt();

    let mut half_widths = BTreeMap::new();
    for level in levels {
        half_widths.insert(level.label(), level.z_score()? * standard_error);
    }

    Ok(ConfidenceReport {
        mean: mean(values),
        std_dev,
        n: values.len(),
        half_widths,
    })
}
