//! Learners that adapt themselves one gradient step at a time

use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::machine_learning::core::{DifferentiableModel, Logits, ModelError};
use crate::machine_learning::loss::Loss;
use crate::machine_learning::optimizer::{GradientDescent, Optimizer, PerParameterDescent};

/// Step size every Meta-SGD parameter starts from
pub const META_SGD_INITIAL_RATE: f64 = 0.01;

/// A classifier that can fine-tune its own parameters on a support set.
///
/// Evaluation clones the shared base learner once per episode and adapts only
/// the clone, so the base is never touched.
pub trait AdaptableLearner {
    fn predict(&self, inputs: &Array2<f64>) -> Result<Logits, ModelError>;

    /// Number of classes the classifier head scores
    fn output_dim(&self) -> usize;

    /// Takes one in-place gradient step on `loss`
    fn adapt(&mut self, loss: &Loss) -> Result<(), ModelError>;

    /// An independent copy with its own parameter storage
    fn clone_learner(&self) -> Self
    where
        Self: Sized;
}

fn gradient_step<M, O>(model: &mut M, optimizer: &O, loss: &Loss) -> Result<(), ModelError>
where
    M: DifferentiableModel,
    O: Optimizer,
{
    let gradients = model.backward(loss)?;
    let mut parameters = model.get_parameters();
    optimizer.update(&mut parameters, &gradients)?;
    model.set_parameters(&parameters)
}

/// MAML-style learner: plain gradient descent at a fixed step size
#[derive(Debug, Clone)]
pub struct Maml<M> {
    model: M,
    optimizer: GradientDescent,
}

impl<M: DifferentiableModel> Maml<M> {
    pub fn new(model: M, learning_rate: f64) -> Self {
        Maml {
            model,
            optimizer: GradientDescent::new(learning_rate),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }
}

impl<M: DifferentiableModel> AdaptableLearner for Maml<M> {
    fn predict(&self, inputs: &Array2<f64>) -> Result<Logits, ModelError> {
        self.model.forward(inputs)
    }

    fn output_dim(&self) -> usize {
        self.model.dimensions().1
    }

    fn adapt(&mut self, loss: &Loss) -> Result<(), ModelError> {
        gradient_step(&mut self.model, &self.optimizer, loss)
    }

    fn clone_learner(&self) -> Self {
        self.clone()
    }
}

/// Meta-SGD learner: one step size per parameter
#[derive(Debug, Clone)]
pub struct MetaSgd<M> {
    model: M,
    optimizer: PerParameterDescent,
}

impl<M: DifferentiableModel> MetaSgd<M> {
    /// Every parameter starts from the same step size
    pub fn new(model: M, initial_rate: f64) -> Self {
        let optimizer = PerParameterDescent::uniform(model.parameter_count(), initial_rate);
        MetaSgd { model, optimizer }
    }

    /// Uses previously learned per-parameter step sizes
    pub fn with_rates(model: M, learning_rates: Vec<f64>) -> Result<Self, ModelError> {
        if learning_rates.len() != model.parameter_count() {
            return Err(ModelError::DimensionMismatch(format!(
                "{} step sizes for {} parameters",
                learning_rates.len(),
                model.parameter_count()
            )));
        }

        Ok(MetaSgd {
            model,
            optimizer: PerParameterDescent::from_rates(learning_rates),
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn learning_rates(&self) -> &[f64] {
        self.optimizer.learning_rates()
    }
}

impl<M: DifferentiableModel> AdaptableLearner for MetaSgd<M> {
    fn predict(&self, inputs: &Array2<f64>) -> Result<Logits, ModelError> {
        self.model.forward(inputs)
    }

    fn output_dim(&self) -> usize {
        self.model.dimensions().1
    }

    fn adapt(&mut self, loss: &Loss) -> Result<(), ModelError> {
        gradient_step(&mut self.model, &self.optimizer, loss)
    }

    fn clone_learner(&self) -> Self {
        self.clone()
    }
}

/// Which adaptation algorithm wraps the backbone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaWrapping {
    Maml,
    MetaSgd,
}

impl MetaWrapping {
    /// Adaptation steps this algorithm always uses, overriding configuration
    pub fn forced_adapt_steps(&self) -> Option<usize> {
        match self {
            MetaWrapping::Maml => None,
            MetaWrapping::MetaSgd => Some(1),
        }
    }

    /// Wraps `model`; `adapt_lr` only applies to MAML
    pub fn wrap<M: DifferentiableModel>(self, model: M, adapt_lr: f64) -> AnyLearner<M> {
        match self {
            MetaWrapping::Maml => AnyLearner::Maml(Maml::new(model, adapt_lr)),
            MetaWrapping::MetaSgd => AnyLearner::MetaSgd(MetaSgd::new(model, META_SGD_INITIAL_RATE)),
        }
    }
}

impl FromStr for MetaWrapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "maml" => Ok(MetaWrapping::Maml),
            "metasgd" | "meta-sgd" | "meta_sgd" => Ok(MetaWrapping::MetaSgd),
            other => Err(format!("unknown meta wrapping {:?} (expected maml or metasgd)", other)),
        }
    }
}

impl std::fmt::Display for MetaWrapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetaWrapping::Maml => write!(f, "maml"),
            MetaWrapping::MetaSgd => write!(f, "metasgd"),
        }
    }
}

/// A learner chosen at startup from [`MetaWrapping`]
#[derive(Debug, Clone)]
pub enum AnyLearner<M> {
    Maml(Maml<M>),
    MetaSgd(MetaSgd<M>),
}

impl<M: DifferentiableModel> AnyLearner<M> {
    pub fn model(&self) -> &M {
        match self {
            AnyLearner::Maml(learner) => learner.model(),
            AnyLearner::MetaSgd(learner) => learner.model(),
        }
    }
}

impl<M: DifferentiableModel> AdaptableLearner for AnyLearner<M> {
    fn predict(&self, inputs: &Array2<f64>) -> Result<Logits, ModelError> {
        match self {
            AnyLearner::Maml(learner) => learner.predict(inputs),
            AnyLearner::MetaSgd(learner) => learner.predict(inputs),
        }
    }

    fn output_dim(&self) -> usize {
        match self {
            AnyLearner::Maml(learner) => learner.output_dim(),
            AnyLearner::MetaSgd(learner) => learner.output_dim(),
        }
    }

    fn adapt(&mut self, loss: &Loss) -> Result<(), ModelError> {
        match self {
            AnyLearner::Maml(learner) => learner.adapt(loss),
            AnyLearner::MetaSgd(learner) => learner.adapt(loss),
        }
    }

    fn clone_learner(&self) -> Self {
        match self {
            AnyLearner::Maml(learner) => AnyLearner::Maml(learner.clone_learner()),
            AnyLearner::MetaSgd(learner) => AnyLearner::MetaSgd(learner.clone_learner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_wrapping_parse() {
        assert_eq!("maml".parse::<MetaWrapping>().unwrap(), MetaWrapping::Maml);
        assert_eq!("MetaSGD".parse::<MetaWrapping>().unwrap(), MetaWrapping::MetaSgd);
        assert!("reptile".parse::<MetaWrapping>().is_err());
        assert_eq!(MetaWrapping::MetaSgd.forced_adapt_steps(), Some(1));
        assert_eq!(MetaWrapping::Maml.forced_adapt_steps(), None);
    }
}
