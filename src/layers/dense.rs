use ndarray::{Array1, Array2, ArrayView2, Axis, Ix1, Ix2};
use rand::Rng;

use crate::activations::Activation;
use crate::error::{AnvilError, Result};
use super::initialization::WeightInit;
use super::parameter::{ParamMut, Parameter, Parameterized};

/// A fully connected (dense) layer: `activation(inputs · W + b)`.
#[derive(Clone, Debug)]
pub struct DenseLayer {
    pub weights: Parameter<Ix2>,
    pub biases: Parameter<Ix1>,
    pub activation: Activation,
}

/// Values captured by a traced forward pass, consumed by `backward`.
#[derive(Clone, Debug)]
pub struct DenseTrace {
    inputs: Array2<f32>,
    pre_activation: Array2<f32>,
}

impl DenseLayer {
    /// Create a new dense layer with weights drawn from the initializer
    /// recommended for `activation`. Biases start at zero.
    pub fn new(input_size: usize, output_size: usize, activation: Activation) -> Self {
        Self::with_init(input_size, output_size, activation, WeightInit::for_activation(&activation))
    }

    pub fn with_init(input_size: usize, output_size: usize, activation: Activation, init: WeightInit) -> Self {
        Self::with_init_using(input_size, output_size, activation, init, &mut rand::thread_rng())
    }

    /// Like [`DenseLayer::new`], drawing the weights from `rng`.
    pub fn new_using<R: Rng>(input_size: usize, output_size: usize, activation: Activation, rng: &mut R) -> Self {
        Self::with_init_using(input_size, output_size, activation, WeightInit::for_activation(&activation), rng)
    }

    pub fn with_init_using<R: Rng>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: WeightInit,
        rng: &mut R,
    ) -> Self {
        DenseLayer {
            weights: Parameter::new(init.initialize_weights_using((input_size, output_size), &mut *rng)),
            biases: Parameter::new(init.initialize_biases_using(output_size, rng)),
            activation,
        }
    }

    pub fn with_weights(mut self, weights: Array2<f32>) -> Result<Self> {
        if weights.dim() != self.weights.value.dim() {
            return Err(AnvilError::dimension_mismatch(
                format!("{:?}", self.weights.value.dim()),
                format!("{:?}", weights.dim()),
            ));
        }
        self.weights = Parameter::new(weights);
        Ok(self)
    }

    pub fn with_biases(mut self, biases: Array1<f32>) -> Result<Self> {
        if biases.dim() != self.biases.value.dim() {
            return Err(AnvilError::dimension_mismatch(
                format!("{}", self.biases.value.dim()),
                format!("{}", biases.dim()),
            ));
        }
        self.biases = Parameter::new(biases);
        Ok(self)
    }

    pub fn input_size(&self) -> usize {
        self.weights.value.shape()[0]
    }

    pub fn output_size(&self) -> usize {
        self.weights.value.shape()[1]
    }

    fn affine(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        inputs.dot(&self.weights.value) + &self.biases.value.view().insert_axis(Axis(0))
    }

    /// Inference-only forward pass for a batch.
    pub fn forward(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut outputs = self.affine(inputs);
        self.activation.apply_batch(&mut outputs);
        outputs
    }

    /// Forward pass that also returns what `backward` needs.
    pub fn forward_traced(&self, inputs: ArrayView2<f32>) -> (Array2<f32>, DenseTrace) {
        let pre_activation = self.affine(inputs);
        let mut outputs = pre_activation.clone();
        self.activation.apply_batch(&mut outputs);
        let trace = DenseTrace {
            inputs: inputs.to_owned(),
            pre_activation,
        };
        (outputs, trace)
    }

    /// Accumulate weight and bias gradients for `output_grads` and return the
    /// gradient with respect to the layer inputs.
    pub fn backward(&mut self, trace: &DenseTrace, output_grads: ArrayView2<f32>) -> Array2<f32> {
        let activation_deriv = self.activation.derivative_batch(trace.pre_activation.view());
        let adjusted = &output_grads * &activation_deriv;
        self.weights.grad += &trace.inputs.t().dot(&adjusted);
        self.biases.grad += &adjusted.sum_axis(Axis(0));
        adjusted.dot(&self.weights.value.t())
    }
}

impl Parameterized for DenseLayer {
    fn visit_parameters(&mut self, f: &mut dyn FnMut(ParamMut<'_>)) {
        f(self.weights.as_param_mut());
        f(self.biases.as_param_mut());
    }
}
