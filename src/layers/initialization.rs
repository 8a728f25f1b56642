use ndarray::{Array1, Array2};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeightInit {
    /// Xavier/Glorot uniform initialization
    XavierUniform,

    /// He/Kaiming uniform initialization (for ReLU)
    HeUniform,

    /// Uniform distribution with custom range
    Uniform { min: f32, max: f32 },

    /// All zeros
    Zeros,
}

impl WeightInit {
    /// Initialize a `(fan_in, fan_out)` weight matrix from the thread RNG
    pub fn initialize_weights(&self, shape: (usize, usize)) -> Array2<f32> {
        self.initialize_weights_using(shape, &mut rand::thread_rng())
    }

    /// Initialize a `(fan_in, fan_out)` weight matrix from `rng`
    pub fn initialize_weights_using<R: Rng>(&self, shape: (usize, usize), rng: &mut R) -> Array2<f32> {
        let (fan_in, fan_out) = shape;

        match self {
            WeightInit::XavierUniform => {
                let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
                Array2::random_using(shape, Uniform::new_inclusive(-limit, limit), rng)
            }

            WeightInit::HeUniform => {
                let limit = (6.0 / fan_in.max(1) as f32).sqrt();
                Array2::random_using(shape, Uniform::new_inclusive(-limit, limit), rng)
            }

            WeightInit::Uniform { min, max } => {
                Array2::random_using(shape, Uniform::new_inclusive(*min, *max), rng)
            }

            WeightInit::Zeros => Array2::zeros(shape),
        }
    }

    /// Biases start at zero except for the explicit uniform strategy
    pub fn initialize_biases(&self, size: usize) -> Array1<f32> {
        self.initialize_biases_using(size, &mut rand::thread_rng())
    }

    pub fn initialize_biases_using<R: Rng>(&self, size: usize, rng: &mut R) -> Array1<f32> {
        match self {
            WeightInit::Uniform { min, max } => {
                Array1::random_using(size, Uniform::new_inclusive(*min, *max), rng)
            }
            _ => Array1::zeros(size),
        }
    }

    /// Get the recommended initialization for an activation function
    pub fn for_activation(activation: &Activation) -> Self {
        match activation {
            Activation::Relu | Activation::LeakyRelu { .. } | Activation::Elu { .. } => {
                WeightInit::HeUniform
            }
            Activation::Sigmoid | Activation::Tanh | Activation::Linear => {
                WeightInit::XavierUniform
            }
        }
    }
}
