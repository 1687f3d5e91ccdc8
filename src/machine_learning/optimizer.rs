//! Inner-loop update rules used to adapt a model to an episode

use crate::machine_learning::core::ModelError;

/// Trait for optimization algorithms
pub trait Optimizer: Send + Sync {
    /// Update parameters in place using gradients
    fn update(&self, parameters: &mut [f64], gradients: &[f64]) -> Result<(), ModelError>;
}

fn check_lengths(parameters: &[f64], gradients: &[f64]) -> Result<(), ModelError> {
    if parameters.len() != gradients.len() {
        return Err(ModelError::UpdateError(format!(
            "{} parameters but {} gradients",
            parameters.len(),
            gradients.len()
        )));
    }
    Ok(())
}

/// Gradient Descent optimizer with a single fixed step size
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f64,
}

impl GradientDescent {
    /// Creates a new Gradient Descent optimizer
    pub fn new(learning_rate: f64) -> Self {
        GradientDescent { learning_rate }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl Optimizer for GradientDescent {
    fn update(&self, parameters: &mut [f64], gradients: &[f64]) -> Result<(), ModelError> {
        check_lengths(parameters, gradients)?;

        for (param, grad) in parameters.iter_mut().zip(gradients.iter()) {
            *param -= self.learning_rate * grad;
        }

        Ok(())
    }
}

/// Gradient descent with one step size per parameter (Meta-SGD style)
#[derive(Debug, Clone)]
pub struct PerParameterDescent {
    learning_rates: Vec<f64>,
}

impl PerParameterDescent {
    /// Creates an optimizer where every parameter starts at `initial_rate`
    pub fn uniform(parameter_count: usize, initial_rate: f64) -> Self {
        PerParameterDescent {
            learning_rates: vec![initial_rate; parameter_count],
        }
    }

    /// Creates an optimizer from explicit step sizes
    pub fn from_rates(learning_rates: Vec<f64>) -> Self {
        PerParameterDescent { learning_rates }
    }

    pub fn learning_rates(&self) -> &[f64] {
        &self.learning_rates
    }
}

impl Optimizer for PerParameterDescent {
    fn update(&self, parameters: &mut [f64], gradients: &[f64]) -> Result<(), ModelError> {
        check_lengths(parameters, gradients)?;
        if self.learning_rates.len() != parameters.len() {
            return Err(ModelError::UpdateError(format!(
                "{} step sizes for {} parameters",
                self.learning_rates.len(),
                parameters.len()
            )));
        }

        for ((param, grad), rate) in parameters
            .iter_mut()
            .zip(gradients.iter())
            .zip(self.learning_rates.iter())
        {
            *param -= rate * grad;
        }

        Ok(())
    }
}
