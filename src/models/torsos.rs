use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::activations::Activation;
use crate::error::Result;
use crate::layers::{DenseLayer, ParamMut, Parameterized};
use crate::network::{Mlp, MlpTrace};

/// Shared trunk between encoder and head.
#[derive(Clone, Debug)]
pub struct Torso {
    net: Mlp,
}

impl Torso {
    /// Dense torso over `layer_sizes` with `Tanh` between layers.
    pub fn mlp(layer_sizes: &[usize]) -> Result<Self> {
        Self::mlp_with_activation(layer_sizes, Activation::Tanh)
    }

    pub fn mlp_with_activation(layer_sizes: &[usize], activation: Activation) -> Result<Self> {
        Ok(Torso { net: Mlp::new(layer_sizes, activation)? })
    }

    /// Like [`Torso::mlp_with_activation`], drawing the weights from `rng`.
    pub fn mlp_using<R: Rng>(layer_sizes: &[usize], activation: Activation, rng: &mut R) -> Result<Self> {
        Ok(Torso { net: Mlp::new_using(layer_sizes, activation, rng)? })
    }

    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self> {
        Ok(Torso { net: Mlp::from_layers(layers)? })
    }

    pub fn input_size(&self) -> usize {
        self.net.input_size()
    }

    pub fn output_size(&self) -> usize {
        self.net.output_size()
    }

    pub fn forward(&self, features: ArrayView2<f32>) -> Array2<f32> {
        self.net.forward(features)
    }

    pub fn forward_traced(&self, features: ArrayView2<f32>) -> (Array2<f32>, MlpTrace) {
        self.net.forward_traced(features)
    }

    pub fn backward(&mut self, trace: &MlpTrace, output_grads: ArrayView2<f32>) -> Array2<f32> {
        self.net.backward(trace, output_grads)
    }
}

impl Parameterized for Torso {
    fn visit_parameters(&mut self, f: &mut dyn FnMut(ParamMut<'_>)) {
        self.net.visit_parameters(f);
    }
}
