use ndarray::{Array2, ArrayView2, ArrayViewD};
use rand::Rng;

use crate::activations::Activation;
use crate::error::{AnvilError, Result};
use crate::layers::{DenseLayer, ParamMut, Parameterized};
use crate::network::{Mlp, MlpTrace};

/// First stage of an actor or critic: maps raw network inputs to features.
#[derive(Clone, Debug)]
pub struct Encoder {
    net: Mlp,
    /// Per-observation shape a flatten encoder accepts.
    observation_shape: Option<Vec<usize>>,
}

impl Encoder {
    /// Passes `size` input features through unchanged. Has no parameters.
    pub fn identity(size: usize) -> Self {
        Encoder { net: Mlp::identity(size), observation_shape: None }
    }

    /// Accepts observations of `shape` and passes them on as one flat row each.
    /// Has no parameters; batches go through [`Encoder::flatten_batch`] first.
    pub fn flatten(shape: &[usize]) -> Result<Self> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(AnvilError::invalid_parameter(
                "shape".to_string(),
                format!("observation shape must be non-empty and positive, got {:?}", shape),
            ));
        }
        let size = shape.iter().product();
        Ok(Encoder { net: Mlp::identity(size), observation_shape: Some(shape.to_vec()) })
    }

    /// Reshape a `(batch, ..shape)` array into `(batch, features)` rows.
    /// Encoders without a fixed observation shape take two-dimensional batches as they are.
    pub fn flatten_batch(&self, observations: ArrayViewD<f32>) -> Result<Array2<f32>> {
        let batch = observations.shape().first().copied().unwrap_or(0);
        let matches = match &self.observation_shape {
            Some(shape) => observations.shape()[1.min(observations.ndim())..] == shape[..],
            None => observations.ndim() == 2 && observations.shape()[1] == self.input_size(),
        };
        if !matches {
            let expected = self.observation_shape.clone().unwrap_or_else(|| vec![self.input_size()]);
            return Err(AnvilError::dimension_mismatch(
                format!("observations of shape (batch, {:?})", expected),
                format!("{:?}", observations.shape()),
            ));
        }
        let flat = observations.iter().cloned().collect::<Vec<_>>();
        Array2::from_shape_vec((batch, self.input_size()), flat)
            .map_err(|e| AnvilError::dimension_mismatch(format!("{} features", self.input_size()), e.to_string()))
    }

    /// A dense encoder from `input_size` to `output_size` features.
    pub fn mlp(input_size: usize, output_size: usize) -> Result<Self> {
        Ok(Encoder { net: Mlp::new(&[input_size, output_size], Activation::Tanh)?, observation_shape: None })
    }

    pub fn mlp_using<R: Rng>(input_size: usize, output_size: usize, rng: &mut R) -> Result<Self> {
        Ok(Encoder { net: Mlp::new_using(&[input_size, output_size], Activation::Tanh, rng)?, observation_shape: None })
    }

    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self> {
        Ok(Encoder { net: Mlp::from_layers(layers)?, observation_shape: None })
    }

    pub fn input_size(&self) -> usize {
        self.net.input_size()
    }

    pub fn output_size(&self) -> usize {
        self.net.output_size()
    }

    pub fn forward(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        self.net.forward(inputs)
    }

    pub fn forward_traced(&self, inputs: ArrayView2<f32>) -> (Array2<f32>, MlpTrace) {
        self.net.forward_traced(inputs)
    }

    pub fn backward(&mut self, trace: &MlpTrace, output_grads: ArrayView2<f32>) -> Array2<f32> {
        self.net.backward(trace, output_grads)
    }
}

impl Parameterized for Encoder {
    fn visit_parameters(&mut self, f: &mut dyn FnMut(ParamMut<'_>)) {
        self.net.visit_parameters(f);
    }
}
