//! Repeated clone → sample → adapt → record over many episodes

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::adaptation::fast_adapt::{fast_adapt, EpisodeResult};
use crate::adaptation::learner::AdaptableLearner;
use crate::episodic::{EpisodicSampler, IndexPartition};
use crate::error::{EpisodeError, Result};
use crate::machine_learning::dataset::Dataset;
use crate::machine_learning::loss::LossFunction;
use crate::metrics::confidence::{confidence_interval_at, mean, ConfidenceLevel, ConfidenceReport};

/// Per-episode results of a run, in episode order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub accuracies: Vec<f64>,
    pub losses: Vec<f64>,
}

impl RunOutcome {
    fn with_capacity(episodes: usize) -> Self {
        RunOutcome {
            accuracies: Vec::with_capacity(episodes),
            losses: Vec::with_capacity(episodes),
        }
    }

    fn push(&mut self, result: EpisodeResult) {
        self.accuracies.push(result.accuracy);
        self.losses.push(result.loss);
    }

    pub fn len(&self) -> usize {
        self.accuracies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accuracies.is_empty()
    }

    /// Means over the recorded episodes, accuracy in percent, with intervals at `levels`
    pub fn summarize(&self, levels: &[ConfidenceLevel]) -> Result<RunSummary> {
        let percent: Vec<f64> = self.accuracies.iter().map(|a| a * 100.0).collect();
        let accuracy_ci = confidence_interval_at(&percent, levels)?;

        Ok(RunSummary {
            episodes: self.len(),
            mean_accuracy: accuracy_ci.mean,
            mean_loss: mean(&self.losses),
            accuracy_ci,
        })
    }

    /// Summary at the reported 90% and 95% levels
    pub fn summary(&self) -> Result<RunSummary> {
        self.summarize(&ConfidenceLevel::REPORTED)
    }
}

/// Aggregate result of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub episodes: usize,
    /// Mean query accuracy in percent
    pub mean_accuracy: f64,
    pub mean_loss: f64,
    /// Interval over per-episode accuracies in percent
    pub accuracy_ci: ConfidenceReport,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (label, half_width) in &self.accuracy_ci.half_widths {
            writeln!(
                f,
                "Test Accuracy ({} ci) : {:.2} ±{:.2}",
                label, self.mean_accuracy, half_width
            )?;
        }
        write!(f, "Test Loss : {:.4}", self.mean_loss)
    }
}

/// Evaluates a base learner over episodes drawn from one sampler.
///
/// The base learner is only ever borrowed; each episode adapts a fresh clone
/// that is dropped when the episode ends.
pub struct EpisodeRunner<'a, L, F: ?Sized, D, R = ChaCha8Rng> {
    base: &'a L,
    loss_fn: &'a F,
    sampler: EpisodicSampler<D, R>,
    partition: IndexPartition,
    adapt_steps: usize,
}

impl<'a, L, F, D, R> EpisodeRunner<'a, L, F, D, R>
where
    L: AdaptableLearner,
    F: LossFunction + ?Sized,
    D: Dataset,
    R: Rng,
{
    /// Fails with `InvalidConfig` when the learner's head cannot score every episode label
    pub fn new(base: &'a L, loss_fn: &'a F, sampler: EpisodicSampler<D, R>, adapt_steps: usize) -> Result<Self> {
        let partition = sampler.shape().partition()?;
        let way = sampler.shape().way;
        if base.output_dim() < way {
            return Err(EpisodeError::InvalidConfig(format!(
                "{}-way episodes need a classifier head of at least {} outputs, learner has {}",
                way,
                way,
                base.output_dim()
            )));
        }

        Ok(EpisodeRunner {
            base,
            loss_fn,
            sampler,
            partition,
            adapt_steps,
        })
    }

    pub fn partition(&self) -> &IndexPartition {
        &self.partition
    }

    pub fn sampler(&self) -> &EpisodicSampler<D, R> {
        &self.sampler
    }

    /// Runs `total_episodes` episodes in sequence
    pub fn run(&mut self, total_episodes: usize) -> Result<RunOutcome> {
        self.run_with(total_episodes, |_, _| {})
    }

    /// Like [`run`](Self::run), reporting each episode (1-based) as it completes
    pub fn run_with<C>(&mut self, total_episodes: usize, mut on_episode: C) -> Result<RunOutcome>
    where
        C: FnMut(usize, &EpisodeResult),
    {
        check_episode_count(total_episodes)?;
        let mut outcome = RunOutcome::with_capacity(total_episodes);

        for episode_no in 1..=total_episodes {
            let mut learner = self.base.clone_learner();
            let episode = self.sampler.sample()?;
            let result = fast_adapt(&episode, &self.partition, &mut learner, self.loss_fn, self.adapt_steps)?;

            log_episode(episode_no, total_episodes, &result);
            on_episode(episode_no, &result);
            outcome.push(result);
        }

        Ok(outcome)
    }
}

impl<'a, L, F, D, R> EpisodeRunner<'a, L, F, D, R>
where
    L: AdaptableLearner + Sync,
    F: LossFunction + ?Sized,
    D: Dataset + Sync,
    R: Sync,
{
    /// Runs episodes on the rayon pool.
    ///
    /// Episode `i` samples from a `ChaCha8Rng` seeded with `seed` on stream `i`,
    /// so the outcome is reproducible and in episode order whatever the
    /// scheduling. The sampler's own random source is not consumed.
    pub fn run_parallel(&self, total_episodes: usize, seed: u64) -> Result<RunOutcome> {
        check_episode_count(total_episodes)?;
        debug!(threads = rayon::current_num_threads(), "parallel evaluation");

        let results: Vec<EpisodeResult> = (0..total_episodes)
            .into_par_iter()
            .map(|index| -> Result<EpisodeResult> {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(index as u64);

                let mut learner = self.base.clone_learner();
                let episode = self.sampler.sample_with(&mut rng)?;
                let result = fast_adapt(&episode, &self.partition, &mut learner, self.loss_fn, self.adapt_steps)?;

                log_episode(index + 1, total_episodes, &result);
                Ok(result)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut outcome = RunOutcome::with_capacity(total_episodes);
        for result in results {
            outcome.push(result);
        }
        Ok(outcome)
    }
}

fn check_episode_count(total_episodes: usize) -> Result<()> {
    if total_episodes == 0 {
        return Err(EpisodeError::InvalidConfig(
            "total_episodes must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn log_episode(episode_no: usize, total_episodes: usize, result: &EpisodeResult) {
    info!(
        "[{}/{}] acc:{:.3}, loss:{:.4}",
        episode_no,
        total_episodes,
        result.accuracy * 100.0,
        result.loss
    );
}
