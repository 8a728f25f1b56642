use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::activations::Activation;
use crate::error::{AnvilError, Result};
use crate::layers::{DenseLayer, DenseTrace, ParamMut, Parameterized};

/// A stack of dense layers applied in order.
///
/// This is the trainable core of every encoder, torso and head. A stack with
/// no layers is the identity on vectors of `passthrough_size` elements.
#[derive(Clone, Debug)]
pub struct Mlp {
    pub layers: Vec<DenseLayer>,
    passthrough_size: usize,
}

/// Per-layer traces of a traced forward pass, in layer order.
#[derive(Clone, Debug, Default)]
pub struct MlpTrace {
    layers: Vec<DenseTrace>,
}

impl Mlp {
    /// Build a stack from `layer_sizes`, using `activation` after every layer.
    /// `[2, 3, 1]` yields two layers, 2→3 and 3→1.
    pub fn new(layer_sizes: &[usize], activation: Activation) -> Result<Self> {
        Self::new_using(layer_sizes, activation, &mut rand::thread_rng())
    }

    /// Like [`Mlp::new`], drawing every layer's weights from `rng` in order.
    pub fn new_using<R: Rng>(layer_sizes: &[usize], activation: Activation, rng: &mut R) -> Result<Self> {
        if layer_sizes.len() < 2 {
            return Err(AnvilError::InvalidParameter {
                name: "layer_sizes".to_string(),
                reason: "Must have at least 2 layer sizes".to_string(),
            });
        }
        if let Some(&zero) = layer_sizes.iter().find(|&&s| s == 0) {
            return Err(AnvilError::invalid_parameter(
                "layer_sizes".to_string(),
                format!("layer size must be positive, got {}", zero),
            ));
        }

        let layers = layer_sizes
            .windows(2)
            .map(|window| DenseLayer::new_using(window[0], window[1], activation, &mut *rng))
            .collect::<Vec<_>>();

        Ok(Mlp { layers, passthrough_size: layer_sizes[0] })
    }

    /// Wrap hand-built layers, checking that consecutive sizes chain.
    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self> {
        let first = layers.first().ok_or_else(|| {
            AnvilError::invalid_parameter("layers", "Must contain at least one layer")
        })?;
        let passthrough_size = first.input_size();

        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].output_size() != pair[1].input_size() {
                return Err(AnvilError::shape_configuration(
                    format!("layer {} input", i + 1),
                    pair[0].output_size(),
                    pair[1].input_size(),
                ));
            }
        }

        Ok(Mlp { layers, passthrough_size })
    }

    /// An empty stack over `size` features.
    pub fn identity(size: usize) -> Self {
        Mlp { layers: Vec::new(), passthrough_size: size }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(self.passthrough_size, DenseLayer::input_size)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(self.passthrough_size, DenseLayer::output_size)
    }

    /// Inference-only forward pass for a batch of input rows.
    pub fn forward(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut current_output = inputs.to_owned();
        for layer in &self.layers {
            current_output = layer.forward(current_output.view());
        }
        current_output
    }

    pub fn forward_traced(&self, inputs: ArrayView2<f32>) -> (Array2<f32>, MlpTrace) {
        let mut trace = MlpTrace { layers: Vec::with_capacity(self.layers.len()) };
        let mut current_output = inputs.to_owned();
        for layer in &self.layers {
            let (output, layer_trace) = layer.forward_traced(current_output.view());
            trace.layers.push(layer_trace);
            current_output = output;
        }
        (current_output, trace)
    }

    /// Backpropagate `output_grads` through every layer, accumulating parameter
    /// gradients, and return the gradient with respect to the stack inputs.
    pub fn backward(&mut self, trace: &MlpTrace, output_grads: ArrayView2<f32>) -> Array2<f32> {
        let mut current_error = output_grads.to_owned();
        for (layer, layer_trace) in self.layers.iter_mut().zip(trace.layers.iter()).rev() {
            current_error = layer.backward(layer_trace, current_error.view());
        }
        current_error
    }
}

impl Parameterized for Mlp {
    fn visit_parameters(&mut self, f: &mut dyn FnMut(ParamMut<'_>)) {
        for layer in &mut self.layers {
            layer.visit_parameters(f);
        }
    }
}
