//! Evaluation configuration threaded through construction

use std::path::Path;
use std::str::FromStr;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::adaptation::MetaWrapping;
use crate::episodic::{EpisodeShape, TaskBudget};
use crate::error::{EpisodeError, Result};

/// Mixed into the seed for data synthesis and weight init so they never share
/// a key with the episode streams
const MODEL_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Benchmark the evaluation data is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetName {
    MiniImagenet,
    Cub,
    TieredImagenet,
    Fc100,
    CifarFs,
}

impl DatasetName {
    /// Short tag used in run names
    pub fn short_name(&self) -> &'static str {
        match self {
            DatasetName::MiniImagenet => "mini",
            DatasetName::Cub => "cub",
            DatasetName::TieredImagenet => "tiered",
            DatasetName::Fc100 => "fc100",
            DatasetName::CifarFs => "cifarfs",
        }
    }
}

impl FromStr for DatasetName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "MiniImagenet" | "mini_imagenet" | "mini-imagenet" | "mini" => Ok(DatasetName::MiniImagenet),
            "cub" | "CUB" | "CUB_200_2011" => Ok(DatasetName::Cub),
            "TieredImagenet" | "tiered_imagenet" | "tiered-imagenet" | "tiered" => {
                Ok(DatasetName::TieredImagenet)
            }
            "FC100" | "fc100" => Ok(DatasetName::Fc100),
            "CIFARFS" | "cifarfs" => Ok(DatasetName::CifarFs),
            other => Err(format!("unknown dataset name {:?}", other)),
        }
    }
}

/// Episode shape and inner-loop length of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub way: usize,
    pub shot: usize,
    pub query: usize,
    pub adapt_steps: usize,
}

impl PhaseConfig {
    pub fn shape(&self) -> Result<EpisodeShape> {
        EpisodeShape::new(self.way, self.shot, self.query)
    }
}

/// Everything a run needs, resolved once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub seed: u64,
    pub dataset_name: DatasetName,
    pub train: PhaseConfig,
    pub test: PhaseConfig,
    /// Inner-loop step size for MAML
    pub adapt_lr: f64,
    /// Episodes evaluated per run
    pub total_episodes: usize,
    /// `-1` for unbounded sampling, otherwise the size of a fixed task pool
    pub num_tasks: i64,
    pub meta_wrapping: MetaWrapping,
    /// Hidden layer widths of the backbone
    pub hidden_layers: Vec<usize>,
    pub save_name_tag: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            seed: 2023,
            dataset_name: DatasetName::MiniImagenet,
            train: PhaseConfig {
                way: 5,
                shot: 5,
                query: 5,
                adapt_steps: 5,
            },
            test: PhaseConfig {
                way: 5,
                shot: 5,
                query: 15,
                adapt_steps: 5,
            },
            adapt_lr: 0.01,
            total_episodes: 2000,
            num_tasks: -1,
            meta_wrapping: MetaWrapping::Maml,
            hidden_layers: vec![64, 64],
            save_name_tag: "strong_baseline".to_string(),
        }
    }
}

impl EvaluationConfig {
    /// Reads a JSON configuration; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Checks every value and applies algorithm-imposed overrides
    pub fn resolve(mut self) -> Result<Self> {
        self.train.shape()?;
        self.test.shape()?;

        if self.total_episodes == 0 {
            return Err(EpisodeError::InvalidConfig("total_episodes must be at least 1".to_string()));
        }
        if !(self.adapt_lr.is_finite() && self.adapt_lr > 0.0) {
            return Err(EpisodeError::InvalidConfig(format!(
                "adapt_lr must be positive, got {}",
                self.adapt_lr
            )));
        }
        if self.hidden_layers.contains(&0) {
            return Err(EpisodeError::InvalidConfig("hidden layer widths must be positive".to_string()));
        }
        // The classifier head is sized for training episodes
        if self.test.way > self.train.way {
            return Err(EpisodeError::InvalidConfig(format!(
                "test way {} exceeds the {}-way classifier head",
                self.test.way, self.train.way
            )));
        }
        self.task_budget()?;

        if let Some(steps) = self.meta_wrapping.forced_adapt_steps() {
            self.train.adapt_steps = steps;
            self.test.adapt_steps = steps;
        }

        Ok(self)
    }

    /// Random source for the synthetic dataset and backbone weights.
    ///
    /// Keyed by `seed ^ MODEL_SEED_SALT`; episodes draw from `seed` itself
    /// (stream 0 sequentially, stream `i` for parallel episode `i`).
    pub fn model_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed ^ MODEL_SEED_SALT)
    }

    pub fn task_budget(&self) -> Result<TaskBudget> {
        TaskBudget::from_num_tasks(self.num_tasks)
    }

    /// Width of the classifier head
    pub fn num_classes(&self) -> usize {
        self.train.way
    }

    /// e.g. `mini_5w5s_strong_baseline`
    pub fn run_name(&self) -> String {
        format!(
            "{}_{}w{}s_{}",
            self.dataset_name.short_name(),
            self.test.way,
            self.test.shot,
            self.save_name_tag
        )
    }
}
