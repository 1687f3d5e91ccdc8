//! Fast adaptation of cloned learners and the episode loop around it

pub mod learner;
pub mod fast_adapt;
pub mod runner;

pub use learner::{AdaptableLearner, AnyLearner, Maml, MetaSgd, MetaWrapping, META_SGD_INITIAL_RATE};
pub use fast_adapt::{fast_adapt, EpisodeResult};
pub use runner::{EpisodeRunner, RunOutcome, RunSummary};
