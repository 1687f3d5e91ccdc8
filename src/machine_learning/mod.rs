//! Backbone models, losses, update rules and datasets
//!
//! These are the collaborators the episodic protocol drives: a differentiable
//! classifier, a loss that can be backpropagated through it, the inner-loop
//! update rule and a labelled dataset that can be grouped by class.

pub mod core;
pub mod loss;
pub mod optimizer;
pub mod dataset;

/// Re-exports of commonly used components
pub mod prelude {
    pub use super::core::{
        DifferentiableModel, FeedForwardNN, ForwardTrace, LinearModel, Logits, Model, ModelError,
    };
    pub use super::loss::{Loss, LossFunction, SoftmaxCrossEntropy};
    pub use super::optimizer::{GradientDescent, Optimizer, PerParameterDescent};
    pub use super::dataset::{ClassIndex, Dataset, DatasetError, LabeledDataset};
}
