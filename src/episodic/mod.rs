//! Episode layout and sampling
//!
//! An episode is a `way * (shot + query)` batch laid out class by class. The
//! sampler produces episodes in that layout and the partition slices every one
//! of them into support and query rows with the same two index lists.

pub mod partition;
pub mod sampler;

pub use partition::{EpisodeShape, IndexPartition};
pub use sampler::{Episode, EpisodicSampler, TaskBudget};
