//! Inner-loop adaptation on the support rows, evaluation on the query rows

use serde::{Deserialize, Serialize};

use crate::adaptation::learner::AdaptableLearner;
use crate::episodic::{Episode, IndexPartition};
use crate::error::Result;
use crate::machine_learning::loss::LossFunction;
use crate::metrics::accuracy;

/// Query-set outcome of one episode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub loss: f64,
    /// Fraction of query rows classified correctly, in `[0, 1]`
    pub accuracy: f64,
}

/// Adapts `learner` to the support rows of `episode` and scores it on the query rows.
///
/// Runs exactly `adapt_steps` predict → loss → adapt iterations; with zero
/// steps the unadapted learner is evaluated directly.
pub fn fast_adapt<L, F>(
    episode: &Episode,
    partition: &IndexPartition,
    learner: &mut L,
    loss_fn: &F,
    adapt_steps: usize,
) -> Result<EpisodeResult>
where
    L: AdaptableLearner,
    F: LossFunction + ?Sized,
{
    let (adaptation_inputs, adaptation_labels) = episode.select(partition.adaptation())?;
    let (evaluation_inputs, evaluation_labels) = episode.select(partition.evaluation())?;

    for _ in 0..adapt_steps {
        let logits = learner.predict(&adaptation_inputs)?;
        let loss = loss_fn.loss(&logits, &adaptation_labels)?;
        learner.adapt(&loss)?;
    }

    let logits = learner.predict(&evaluation_inputs)?;
    let loss = loss_fn.loss(&logits, &evaluation_labels)?;
    let accuracy = accuracy(logits.values(), &evaluation_labels)?;

    Ok(EpisodeResult {
        loss: loss.value(),
        accuracy,
    })
}
