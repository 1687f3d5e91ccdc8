//! Loss functions for machine learning models

use ndarray::{Array1, Array2, ArrayView1};

use crate::machine_learning::core::{ForwardTrace, Logits, ModelError};

/// A scalar loss together with what is needed to differentiate it.
///
/// Holds the gradient of the loss with respect to the logits and the forward
/// trace that produced those logits, so the model that made the prediction can
/// turn it into parameter gradients.
#[derive(Debug, Clone)]
pub struct Loss {
    value: f64,
    logit_gradients: Array2<f64>,
    trace: ForwardTrace,
}

impl Loss {
    pub fn new(value: f64, logit_gradients: Array2<f64>, trace: ForwardTrace) -> Self {
        Loss {
            value,
            logit_gradients,
            trace,
        }
    }

    /// The scalar loss value
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn logit_gradients(&self) -> &Array2<f64> {
        &self.logit_gradients
    }

    pub fn trace(&self) -> &ForwardTrace {
        &self.trace
    }
}

/// Trait for classification loss functions
pub trait LossFunction: Send + Sync {
    /// Calculate the loss between a batch of logits and integer class targets
    fn loss(&self, logits: &Logits, targets: &[usize]) -> Result<Loss, ModelError>;
}

/// Helper function to compute softmax probabilities
pub fn softmax(x: &ArrayView1<f64>) -> Array1<f64> {
    let max_val = x.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let exp_x = x.mapv(|xi| (xi - max_val).exp());
    let sum_exp = exp_x.sum();
    exp_x / sum_exp
}

/// Categorical cross-entropy with softmax activation, averaged over the batch
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftmaxCrossEntropy;

impl LossFunction for SoftmaxCrossEntropy {
    fn loss(&self, logits: &Logits, targets: &[usize]) -> Result<Loss, ModelError> {
        let scores = logits.values();
        let (n, classes) = scores.dim();

        if n != targets.len() {
            return Err(ModelError::DimensionMismatch(
                format!("{} logit rows for {} targets", n, targets.len())
            ));
        }
        if n == 0 {
            return Err(ModelError::DimensionMismatch("empty batch".to_string()));
        }

        let mut grads = Array2::zeros((n, classes));
        let mut total = 0.0;

        for (i, &target) in targets.iter().enumerate() {
            if target >= classes {
                return Err(ModelError::DimensionMismatch(
                    format!("target class {} with only {} logits", target, classes)
                ));
            }

            let probs = softmax(&scores.row(i));
            // Clip probabilities to avoid numerical issues
            total -= probs[target].max(1e-15).ln();

            // Gradient of softmax cross-entropy is (p - y)/n
            let mut row = grads.row_mut(i);
            row.assign(&probs);
            row[target] -= 1.0;
        }

        grads /= n as f64;

        Ok(Loss::new(total / n as f64, grads, logits.trace().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_uniform_logits_give_log_k() {
        let logits = Logits::from_values(Array2::zeros((3, 4)));
        let loss = SoftmaxCrossEntropy.loss(&logits, &[0, 1, 3]).unwrap();

        assert_relative_eq!(loss.value(), (4.0f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_rows_sum_to_zero() {
        let logits = Logits::from_values(array![[1.0, 2.0, 0.5], [-1.0, 0.0, 3.0]]);
        let loss = SoftmaxCrossEntropy.loss(&logits, &[2, 0]).unwrap();

        for row in loss.logit_gradients().rows() {
            assert_relative_eq!(row.sum(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rejects_out_of_range_target() {
        let logits = Logits::from_values(Array2::zeros((1, 2)));
        assert!(SoftmaxCrossEntropy.loss(&logits, &[2]).is_err());
        assert!(SoftmaxCrossEntropy.loss(&logits, &[0, 1]).is_err());
    }
}
