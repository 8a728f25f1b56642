use ndarray::{s, Array2, ArrayView2};

use crate::error::{AnvilError, Result};
use crate::layers::{DenseTrace, ParamMut, Parameterized};
use crate::network::MlpTrace;
use super::actor::{shared, Shared};
use super::encoders::Encoder;
use super::heads::{concat_columns, CriticHead, CriticHeadKind};
use super::torsos::Torso;

/// Everything a traced critic forward pass recorded.
pub struct CriticTrace {
    encoder: MlpTrace,
    torso: MlpTrace,
    head: DenseTrace,
    observation_size: usize,
    gathered: Option<Vec<usize>>,
    num_outputs: usize,
}

/// Value network: `head(torso(encoder(input)))`, where the input is the
/// observation, or `[observation, action]` for a continuous Q head.
pub struct Critic {
    pub(crate) encoder: Shared<Encoder>,
    pub(crate) torso: Shared<Torso>,
    pub(crate) head: Shared<CriticHead>,
}

impl Critic {
    pub fn new(encoder: Encoder, torso: Torso, head: CriticHead) -> Result<Self> {
        if encoder.output_size() != torso.input_size() {
            return Err(AnvilError::shape_configuration(
                "critic torso input",
                encoder.output_size(),
                torso.input_size(),
            ));
        }
        if torso.output_size() != head.input_size() {
            return Err(AnvilError::shape_configuration(
                "critic head input",
                torso.output_size(),
                head.input_size(),
            ));
        }
        Ok(Critic {
            encoder: shared(encoder),
            torso: shared(torso),
            head: shared(head),
        })
    }

    pub fn encoder(&self) -> &Shared<Encoder> {
        &self.encoder
    }

    pub fn torso(&self) -> &Shared<Torso> {
        &self.torso
    }

    pub fn head(&self) -> &Shared<CriticHead> {
        &self.head
    }

    pub fn head_kind(&self) -> CriticHeadKind {
        self.head.borrow().kind()
    }

    /// Width of the encoder input (observation plus action for continuous Q heads).
    pub fn input_size(&self) -> usize {
        self.encoder.borrow().input_size()
    }

    fn inputs(&self, observations: ArrayView2<f32>, actions: Option<ArrayView2<f32>>) -> Result<(Array2<f32>, Option<Vec<usize>>)> {
        let kind = self.head_kind();
        let (inputs, gathered) = match (kind, actions) {
            (CriticHeadKind::Value, _) => (observations.to_owned(), None),
            (CriticHeadKind::ContinuousQ, Some(actions)) => {
                if actions.nrows() != observations.nrows() {
                    return Err(AnvilError::dimension_mismatch(
                        format!("{} action rows", observations.nrows()),
                        format!("{}", actions.nrows()),
                    ));
                }
                (concat_columns(observations, actions), None)
            }
            (CriticHeadKind::ContinuousQ, None) => {
                return Err(AnvilError::invalid_parameter(
                    "actions",
                    "a continuous Q critic needs actions",
                ));
            }
            (CriticHeadKind::DiscreteQ, None) => (observations.to_owned(), None),
            (CriticHeadKind::DiscreteQ, Some(actions)) => {
                let num_actions = self.head.borrow().output_size();
                if actions.ncols() != 1 || actions.nrows() != observations.nrows() {
                    return Err(AnvilError::dimension_mismatch(
                        format!("actions of shape ({}, 1)", observations.nrows()),
                        format!("{:?}", actions.dim()),
                    ));
                }
                let indices = actions
                    .column(0)
                    .iter()
                    .map(|&a| {
                        let index = a.round();
                        if !index.is_finite() || index < 0.0 || index as usize >= num_actions {
                            Err(AnvilError::invalid_parameter(
                                "actions".to_string(),
                                format!("action {} outside 0..{}", a, num_actions),
                            ))
                        } else {
                            Ok(index as usize)
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                (observations.to_owned(), Some(indices))
            }
        };

        let expected = self.input_size();
        if inputs.ncols() != expected {
            return Err(AnvilError::dimension_mismatch(
                format!("critic input with {} features", expected),
                format!("{} features", inputs.ncols()),
            ));
        }
        Ok((inputs, gathered))
    }

    fn gather(values: Array2<f32>, gathered: &Option<Vec<usize>>) -> Array2<f32> {
        match gathered {
            Some(indices) => Array2::from_shape_fn((values.nrows(), 1), |(i, _)| values[[i, indices[i]]]),
            None => values,
        }
    }

    /// Value estimates, one row per observation. Value heads ignore `actions`;
    /// discrete Q heads return every action's value unless `actions` selects one.
    pub fn forward(&self, observations: ArrayView2<f32>, actions: Option<ArrayView2<f32>>) -> Result<Array2<f32>> {
        let (inputs, gathered) = self.inputs(observations, actions)?;
        let features = self.encoder.borrow().forward(inputs.view());
        let hidden = self.torso.borrow().forward(features.view());
        let values = self.head.borrow().forward(hidden.view());
        Ok(Self::gather(values, &gathered))
    }

    pub(crate) fn forward_traced(
        &self,
        observations: ArrayView2<f32>,
        actions: Option<ArrayView2<f32>>,
    ) -> Result<(Array2<f32>, CriticTrace)> {
        let (inputs, gathered) = self.inputs(observations, actions)?;
        let (features, encoder) = self.encoder.borrow().forward_traced(inputs.view());
        let (hidden, torso) = self.torso.borrow().forward_traced(features.view());
        let (values, head) = self.head.borrow().forward_traced(hidden.view());
        let num_outputs = values.ncols();
        let trace = CriticTrace {
            encoder,
            torso,
            head,
            observation_size: observations.ncols(),
            gathered,
            num_outputs,
        };
        Ok((Self::gather(values, &trace.gathered), trace))
    }

    /// Backpropagate gradients on the returned values; yields the gradient on the critic input.
    pub(crate) fn backward(&self, trace: &CriticTrace, value_grads: ArrayView2<f32>) -> Array2<f32> {
        let head_grads = match &trace.gathered {
            Some(indices) => {
                let mut scattered = Array2::zeros((value_grads.nrows(), trace.num_outputs));
                for (i, &a) in indices.iter().enumerate() {
                    scattered[[i, a]] = value_grads[[i, 0]];
                }
                scattered
            }
            None => value_grads.to_owned(),
        };
        let hidden_grads = self.head.borrow_mut().backward(&trace.head, head_grads.view());
        let feature_grads = self.torso.borrow_mut().backward(&trace.torso, hidden_grads.view());
        self.encoder.borrow_mut().backward(&trace.encoder, feature_grads.view())
    }

    /// Gradient of the values with respect to the action columns of the input.
    pub(crate) fn backward_to_actions(&self, trace: &CriticTrace, value_grads: ArrayView2<f32>) -> Result<Array2<f32>> {
        if self.head_kind() != CriticHeadKind::ContinuousQ {
            return Err(AnvilError::invalid_parameter(
                "critic",
                "action gradients need a continuous Q head",
            ));
        }
        let input_grads = self.backward(trace, value_grads);
        Ok(input_grads.slice(s![.., trace.observation_size..]).to_owned())
    }

    pub fn visit_parameters(&self, f: &mut dyn FnMut(ParamMut<'_>)) {
        self.encoder.borrow_mut().visit_parameters(f);
        self.torso.borrow_mut().visit_parameters(f);
        self.head.borrow_mut().visit_parameters(f);
    }

    pub fn deep_copy(&self) -> Critic {
        Critic {
            encoder: shared(self.encoder.borrow().clone()),
            torso: shared(self.torso.borrow().clone()),
            head: shared(self.head.borrow().clone()),
        }
    }
}

impl std::fmt::Debug for Critic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Critic")
            .field("input_size", &self.input_size())
            .field("head", &self.head_kind())
            .finish()
    }
}
