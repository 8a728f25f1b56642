use ndarray::{Array1, Array2, ArrayView2, Ix1};

use crate::activations::Activation;
use crate::error::{AnvilError, Result};
use crate::layers::{DenseLayer, DenseTrace, ParamMut, Parameter, Parameterized};
use super::distributions::{ActionDistribution, Categorical, DiagGaussian};

/// What kind of output a policy head produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyHeadKind {
    Deterministic,
    DiagGaussian,
    Categorical,
}

impl PolicyHeadKind {
    pub fn is_distributional(&self) -> bool {
        !matches!(self, PolicyHeadKind::Deterministic)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyHeadKind::Deterministic => "deterministic",
            PolicyHeadKind::DiagGaussian => "diagonal Gaussian",
            PolicyHeadKind::Categorical => "categorical",
        }
    }
}

/// Final stage of an actor.
#[derive(Clone, Debug)]
pub enum PolicyHead {
    /// Maps features straight to an action vector.
    Deterministic { layer: DenseLayer },
    /// Per-observation means with a learned, state-independent log standard deviation.
    DiagGaussian { mean: DenseLayer, log_std: Parameter<Ix1> },
    /// Logits over a discrete action set.
    Categorical { logits: DenseLayer },
}

/// Raw head output before it is wrapped for callers.
#[derive(Clone, Debug)]
pub enum HeadOutput {
    Action(Array2<f32>),
    Gaussian { loc: Array2<f32>, log_std: Array1<f32> },
    Logits(Array2<f32>),
}

/// Upstream gradients flowing into a policy head.
#[derive(Clone, Debug)]
pub struct HeadGradients {
    /// Gradient with respect to the dense output (actions, means or logits).
    pub output: Array2<f32>,
    /// Gradient with respect to the Gaussian log standard deviation.
    pub log_std: Option<Array1<f32>>,
}

/// What an actor hands back from `forward`.
#[derive(Clone, Debug, PartialEq)]
pub enum PolicyOutput {
    Action(Array2<f32>),
    Distribution(ActionDistribution),
}

impl HeadOutput {
    pub fn into_policy_output(self) -> PolicyOutput {
        match self {
            HeadOutput::Action(actions) => PolicyOutput::Action(actions),
            HeadOutput::Gaussian { loc, log_std } => {
                PolicyOutput::Distribution(ActionDistribution::DiagGaussian(DiagGaussian::new(loc, log_std.view())))
            }
            HeadOutput::Logits(logits) => {
                PolicyOutput::Distribution(ActionDistribution::Categorical(Categorical::from_logits(logits)))
            }
        }
    }
}

impl PolicyHead {
    /// Deterministic head; `activation` defaults to `Tanh` for bounded actions.
    pub fn deterministic(input_size: usize, action_size: usize, activation: Option<Activation>) -> Self {
        PolicyHead::Deterministic {
            layer: DenseLayer::new(input_size, action_size, activation.unwrap_or(Activation::Tanh)),
        }
    }

    pub fn diag_gaussian(input_size: usize, action_size: usize) -> Self {
        Self::diag_gaussian_with_log_std(input_size, action_size, 0.0)
    }

    pub fn diag_gaussian_with_log_std(input_size: usize, action_size: usize, log_std_init: f32) -> Self {
        PolicyHead::DiagGaussian {
            mean: DenseLayer::new(input_size, action_size, Activation::Linear),
            log_std: Parameter::new(Array1::from_elem(action_size, log_std_init)),
        }
    }

    pub fn categorical(input_size: usize, num_actions: usize) -> Self {
        PolicyHead::Categorical {
            logits: DenseLayer::new(input_size, num_actions, Activation::Linear),
        }
    }

    pub fn kind(&self) -> PolicyHeadKind {
        match self {
            PolicyHead::Deterministic { .. } => PolicyHeadKind::Deterministic,
            PolicyHead::DiagGaussian { .. } => PolicyHeadKind::DiagGaussian,
            PolicyHead::Categorical { .. } => PolicyHeadKind::Categorical,
        }
    }

    fn layer(&self) -> &DenseLayer {
        match self {
            PolicyHead::Deterministic { layer } => layer,
            PolicyHead::DiagGaussian { mean, .. } => mean,
            PolicyHead::Categorical { logits } => logits,
        }
    }

    fn layer_mut(&mut self) -> &mut DenseLayer {
        match self {
            PolicyHead::Deterministic { layer } => layer,
            PolicyHead::DiagGaussian { mean, .. } => mean,
            PolicyHead::Categorical { logits } => logits,
        }
    }

    pub fn input_size(&self) -> usize {
        self.layer().input_size()
    }

    /// Action dimensionality, or the number of discrete actions.
    pub fn output_size(&self) -> usize {
        self.layer().output_size()
    }

    fn wrap(&self, output: Array2<f32>) -> HeadOutput {
        match self {
            PolicyHead::Deterministic { .. } => HeadOutput::Action(output),
            PolicyHead::DiagGaussian { log_std, .. } => HeadOutput::Gaussian {
                loc: output,
                log_std: log_std.value.clone(),
            },
            PolicyHead::Categorical { .. } => HeadOutput::Logits(output),
        }
    }

    pub fn forward(&self, features: ArrayView2<f32>) -> HeadOutput {
        self.wrap(self.layer().forward(features))
    }

    pub fn forward_traced(&self, features: ArrayView2<f32>) -> (HeadOutput, DenseTrace) {
        let (output, trace) = self.layer().forward_traced(features);
        (self.wrap(output), trace)
    }

    /// Accumulate head gradients and return the gradient on the head input.
    pub fn backward(&mut self, trace: &DenseTrace, grads: &HeadGradients) -> Array2<f32> {
        if let (PolicyHead::DiagGaussian { log_std, .. }, Some(d_log_std)) = (&mut *self, grads.log_std.as_ref()) {
            log_std.grad += d_log_std;
        }
        self.layer_mut().backward(trace, grads.output.view())
    }
}

impl Parameterized for PolicyHead {
    fn visit_parameters(&mut self, f: &mut dyn FnMut(ParamMut<'_>)) {
        match self {
            PolicyHead::Deterministic { layer } => layer.visit_parameters(f),
            PolicyHead::DiagGaussian { mean, log_std } => {
                mean.visit_parameters(f);
                f(log_std.as_param_mut());
            }
            PolicyHead::Categorical { logits } => logits.visit_parameters(f),
        }
    }
}

/// What a critic head estimates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CriticHeadKind {
    /// State value, ignores actions.
    Value,
    /// State-action value for continuous actions; the action is part of the critic input.
    ContinuousQ,
    /// One value per discrete action.
    DiscreteQ,
}

/// Final stage of a critic.
#[derive(Clone, Debug)]
pub struct CriticHead {
    kind: CriticHeadKind,
    layer: DenseLayer,
}

impl CriticHead {
    pub fn value(input_size: usize, activation: Option<Activation>) -> Self {
        CriticHead {
            kind: CriticHeadKind::Value,
            layer: DenseLayer::new(input_size, 1, activation.unwrap_or(Activation::Linear)),
        }
    }

    pub fn continuous_q(input_size: usize, activation: Option<Activation>) -> Self {
        CriticHead {
            kind: CriticHeadKind::ContinuousQ,
            layer: DenseLayer::new(input_size, 1, activation.unwrap_or(Activation::Linear)),
        }
    }

    pub fn discrete_q(input_size: usize, num_actions: usize) -> Self {
        CriticHead {
            kind: CriticHeadKind::DiscreteQ,
            layer: DenseLayer::new(input_size, num_actions, Activation::Linear),
        }
    }

    /// Wrap a hand-built layer. Value and continuous Q heads need one output.
    pub fn from_layer(kind: CriticHeadKind, layer: DenseLayer) -> Result<Self> {
        if kind != CriticHeadKind::DiscreteQ && layer.output_size() != 1 {
            return Err(AnvilError::shape_configuration("critic head output", 1, layer.output_size()));
        }
        Ok(CriticHead { kind, layer })
    }

    pub fn kind(&self) -> CriticHeadKind {
        self.kind
    }

    pub fn input_size(&self) -> usize {
        self.layer.input_size()
    }

    pub fn output_size(&self) -> usize {
        self.layer.output_size()
    }

    pub fn forward(&self, features: ArrayView2<f32>) -> Array2<f32> {
        self.layer.forward(features)
    }

    pub fn forward_traced(&self, features: ArrayView2<f32>) -> (Array2<f32>, DenseTrace) {
        self.layer.forward_traced(features)
    }

    pub fn backward(&mut self, trace: &DenseTrace, output_grads: ArrayView2<f32>) -> Array2<f32> {
        self.layer.backward(trace, output_grads)
    }
}

impl Parameterized for CriticHead {
    fn visit_parameters(&mut self, f: &mut dyn FnMut(ParamMut<'_>)) {
        self.layer.visit_parameters(f);
    }
}

/// Stack the observation and action columns side by side.
pub(crate) fn concat_columns(observations: ArrayView2<f32>, actions: ArrayView2<f32>) -> Array2<f32> {
    let mut inputs = Array2::zeros((observations.nrows(), observations.ncols() + actions.ncols()));
    inputs.slice_mut(ndarray::s![.., ..observations.ncols()]).assign(&observations);
    inputs.slice_mut(ndarray::s![.., observations.ncols()..]).assign(&actions);
    inputs
}
