//! Core traits and types for the classifiers adapted inside an episode

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::error::Error;
use ndarray::{Array1, Array2, Axis};
use rand::Rng;

use crate::machine_learning::loss::Loss;

/// Errors that can occur in machine learning models
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Dimensionality mismatch in input or output data
    DimensionMismatch(String),

    /// Error during forward computation
    ForwardError(String),

    /// Error during backward computation or gradient calculation
    BackwardError(String),

    /// Error during parameter update
    UpdateError(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ModelError::DimensionMismatch(msg) => write!(f, "Dimension mismatch: {}", msg),
            ModelError::ForwardError(msg) => write!(f, "Forward computation error: {}", msg),
            ModelError::BackwardError(msg) => write!(f, "Backward computation error: {}", msg),
            ModelError::UpdateError(msg) => write!(f, "Parameter update error: {}", msg),
        }
    }
}

impl Error for ModelError {}

/// Base trait for all machine learning models
pub trait Model {
    /// Returns the number of trainable parameters in the model
    fn parameter_count(&self) -> usize;

    /// Gets the current model parameters, flattened layer by layer
    fn get_parameters(&self) -> Vec<f64>;

    /// Sets the model parameters from the same flattened layout
    fn set_parameters(&mut self, parameters: &[f64]) -> Result<(), ModelError>;

    /// Returns the input and output dimensions
    fn dimensions(&self) -> (usize, usize);
}

/// Intermediate values recorded by a forward pass.
///
/// The backward pass needs the input to every layer and the pre-activation
/// output of every hidden layer; both are kept here so a [`Loss`] computed
/// from the logits can later be turned into parameter gradients.
#[derive(Debug, Clone, Default)]
pub struct ForwardTrace {
    layer_inputs: Vec<Array2<f64>>,
    pre_activations: Vec<Array2<f64>>,
}

impl ForwardTrace {
    /// Input fed to each layer, first layer first
    pub fn layer_inputs(&self) -> &[Array2<f64>] {
        &self.layer_inputs
    }

    /// Pre-activation outputs of the hidden layers
    pub fn pre_activations(&self) -> &[Array2<f64>] {
        &self.pre_activations
    }

    /// Whether the trace holds anything to backpropagate through
    pub fn is_empty(&self) -> bool {
        self.layer_inputs.is_empty()
    }
}

/// Raw class scores for a batch, one row per example.
#[derive(Debug, Clone)]
pub struct Logits {
    values: Array2<f64>,
    trace: ForwardTrace,
}

impl Logits {
    /// Wraps precomputed scores that carry no forward trace.
    ///
    /// Such logits can be scored but not backpropagated.
    pub fn from_values(values: Array2<f64>) -> Self {
        Logits {
            values,
            trace: ForwardTrace::default(),
        }
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn trace(&self) -> &ForwardTrace {
        &self.trace
    }

    /// Number of examples in the batch
    pub fn batch_size(&self) -> usize {
        self.values.nrows()
    }

    /// Number of classes scored per example
    pub fn num_classes(&self) -> usize {
        self.values.ncols()
    }
}

/// A model whose forward pass can be differentiated with respect to its parameters
pub trait DifferentiableModel: Model + Clone + Send + Sync {
    /// Computes logits for a batch of inputs (one example per row)
    fn forward(&self, inputs: &Array2<f64>) -> Result<Logits, ModelError>;

    /// Computes the gradient of `loss` with respect to every parameter,
    /// in the order returned by [`Model::get_parameters`]
    fn backward(&self, loss: &Loss) -> Result<Vec<f64>, ModelError>;
}

/// Basic feedforward neural network model with ReLU hidden layers
#[derive(Clone, Debug)]
pub struct FeedForwardNN {
    input_dim: usize,
    output_dim: usize,
    hidden_layers: Vec<usize>,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
}

impl FeedForwardNN {
    /// Creates a new feedforward neural network.
    ///
    /// An empty `hidden_layers` yields a plain linear classifier.
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        hidden_layers: Vec<usize>,
        output_dim: usize,
        rng: &mut R,
    ) -> Self {
        // Construct layer dimensions including input and output
        let layer_dims: Vec<usize> = std::iter::once(input_dim)
            .chain(hidden_layers.iter().cloned())
            .chain(std::iter::once(output_dim))
            .collect();

        let mut weights = Vec::with_capacity(layer_dims.len() - 1);
        let mut biases = Vec::with_capacity(layer_dims.len() - 1);

        for pair in layer_dims.windows(2) {
            let (cols, rows) = (pair[0], pair[1]);

            // Xavier initialization for weights
            let weight_scale = 1.0 / (cols.max(1) as f64).sqrt();
            let weight_matrix =
                Array2::from_shape_fn((rows, cols), |_| (2.0 * rng.gen::<f64>() - 1.0) * weight_scale);

            weights.push(weight_matrix);
            biases.push(Array1::zeros(rows));
        }

        FeedForwardNN {
            input_dim,
            output_dim,
            hidden_layers,
            weights,
            biases,
        }
    }

    /// Layer widths, e.g. `32-64-5`
    pub fn architecture(&self) -> String {
        std::iter::once(self.input_dim)
            .chain(self.hidden_layers.iter().cloned())
            .chain(std::iter::once(self.output_dim))
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }

    fn activate(x: f64) -> f64 {
        x.max(0.0)
    }

    fn activate_derivative(x: f64) -> f64 {
        if x > 0.0 { 1.0 } else { 0.0 }
    }
}

impl Model for FeedForwardNN {
    fn parameter_count(&self) -> usize {
        self.weights
            .iter()
            .zip(self.biases.iter())
            .map(|(w, b)| w.len() + b.len())
            .sum()
    }

    fn get_parameters(&self) -> Vec<f64> {
        let mut parameters = Vec::with_capacity(self.parameter_count());

        for (weight, bias) in self.weights.iter().zip(self.biases.iter()) {
            parameters.extend(weight.iter());
            parameters.extend(bias.iter());
        }

        parameters
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<(), ModelError> {
        let expected = self.parameter_count();
        if parameters.len() != expected {
            return Err(ModelError::DimensionMismatch(
                format!("Expected {} parameters, got {}", expected, parameters.len())
            ));
        }

        let mut param_idx = 0;

        for (weight, bias) in self.weights.iter_mut().zip(self.biases.iter_mut()) {
            for w in weight.iter_mut() {
                *w = parameters[param_idx];
                param_idx += 1;
            }

            for b in bias.iter_mut() {
                *b = parameters[param_idx];
                param_idx += 1;
            }
        }

        Ok(())
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.input_dim, self.output_dim)
    }
}

impl DifferentiableModel for FeedForwardNN {
    fn forward(&self, inputs: &Array2<f64>) -> Result<Logits, ModelError> {
        if inputs.ncols() != self.input_dim {
            return Err(ModelError::DimensionMismatch(
                format!("Expected input dim {}, got {}", self.input_dim, inputs.ncols())
            ));
        }

        let mut trace = ForwardTrace::default();
        let mut current = inputs.to_owned();
        let last = self.weights.len() - 1;

        for (layer, (weight, bias)) in self.weights.iter().zip(self.biases.iter()).enumerate() {
            // Linear transformation: XWᵀ + b
            let next = current.dot(&weight.t()) + bias;
            trace.layer_inputs.push(current);

            if layer == last {
                current = next;
            } else {
                current = next.mapv(Self::activate);
                trace.pre_activations.push(next);
            }
        }

        if current.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::ForwardError("non-finite logits".to_string()));
        }

        Ok(Logits { values: current, trace })
    }

    fn backward(&self, loss: &Loss) -> Result<Vec<f64>, ModelError> {
        let trace = loss.trace();
        if trace.layer_inputs.len() != self.weights.len()
            || trace.pre_activations.len() + 1 != self.weights.len()
        {
            return Err(ModelError::BackwardError(format!(
                "trace has {} layers, network has {}",
                trace.layer_inputs.len(),
                self.weights.len()
            )));
        }

        let mut delta = loss.logit_gradients().to_owned();
        if delta.ncols() != self.output_dim {
            return Err(ModelError::BackwardError(format!(
                "loss gradient has {} classes, network outputs {}",
                delta.ncols(),
                self.output_dim
            )));
        }

        let mut layer_grads: Vec<(Array2<f64>, Array1<f64>)> = Vec::with_capacity(self.weights.len());

        for layer in (0..self.weights.len()).rev() {
            let layer_input = &trace.layer_inputs[layer];
            let weight_grad = delta.t().dot(layer_input);
            let bias_grad = delta.sum_axis(Axis(0));

            if layer > 0 {
                let mut upstream = delta.dot(&self.weights[layer]);
                upstream.zip_mut_with(&trace.pre_activations[layer - 1], |g, &z| {
                    *g *= Self::activate_derivative(z)
                });
                delta = upstream;
            }

            layer_grads.push((weight_grad, bias_grad));
        }

        let mut gradients = Vec::with_capacity(self.parameter_count());
        for (weight_grad, bias_grad) in layer_grads.iter().rev() {
            gradients.extend(weight_grad.iter());
            gradients.extend(bias_grad.iter());
        }

        Ok(gradients)
    }
}

/// Single affine layer `XWᵀ + b` producing logits directly
#[derive(Clone, Debug)]
pub struct LinearModel {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl LinearModel {
    /// Xavier-initialised weights, zero bias
    pub fn new<R: Rng + ?Sized>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        let scale = 1.0 / (input_dim.max(1) as f64).sqrt();
        let weights =
            Array2::from_shape_fn((output_dim, input_dim), |_| (2.0 * rng.gen::<f64>() - 1.0) * scale);

        LinearModel {
            weights,
            bias: Array1::zeros(output_dim),
        }
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn bias(&self) -> &Array1<f64> {
        &self.bias
    }
}

impl Model for LinearModel {
    fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    fn get_parameters(&self) -> Vec<f64> {
        self.weights.iter().chain(self.bias.iter()).copied().collect()
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<(), ModelError> {
        if parameters.len() != self.parameter_count() {
            return Err(ModelError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                self.parameter_count(),
                parameters.len()
            )));
        }

        let (weights, bias) = parameters.split_at(self.weights.len());
        self.weights.iter_mut().zip(weights).for_each(|(w, &p)| *w = p);
        self.bias.iter_mut().zip(bias).for_each(|(b, &p)| *b = p);
        Ok(())
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.weights.ncols(), self.weights.nrows())
    }
}

impl DifferentiableModel for LinearModel {
    fn forward(&self, inputs: &Array2<f64>) -> Result<Logits, ModelError> {
        if inputs.ncols() != self.weights.ncols() {
            return Err(ModelError::DimensionMismatch(format!(
                "Expected input dim {}, got {}",
                self.weights.ncols(),
                inputs.ncols()
            )));
        }

        let values = inputs.dot(&self.weights.t()) + &self.bias;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::ForwardError("non-finite logits".to_string()));
        }

        let trace = ForwardTrace {
            layer_inputs: vec![inputs.to_owned()],
            pre_activations: Vec::new(),
        };
        Ok(Logits { values, trace })
    }

    fn backward(&self, loss: &Loss) -> Result<Vec<f64>, ModelError> {
        let trace = loss.trace();
        if trace.layer_inputs.len() != 1 || !trace.pre_activations.is_empty() {
            return Err(ModelError::BackwardError(format!(
                "trace has {} layers, linear model has 1",
                trace.layer_inputs.len()
            )));
        }

        let delta = loss.logit_gradients();
        if delta.ncols() != self.weights.nrows() {
            return Err(ModelError::BackwardError(format!(
                "loss gradient has {} classes, model outputs {}",
                delta.ncols(),
                self.weights.nrows()
            )));
        }

        let weight_grad = delta.t().dot(&trace.layer_inputs[0]);
        let bias_grad = delta.sum_axis(Axis(0));
        Ok(weight_grad.iter().chain(bias_grad.iter()).copied().collect())
    }
}
