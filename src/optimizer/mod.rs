pub mod gradient_clipper;

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AnvilError, Result};
use crate::layers::{ParamId, ParamMut};

pub use gradient_clipper::GradientClipper;

/// Applies one descent step to a parameter from its accumulated gradient.
pub trait Optimizer {
    fn update(&mut self, param: ParamMut<'_>, learning_rate: f32);
}

/// Serializable choice of optimizer, part of every gradient updater config.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Sgd,
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
    RmsProp { beta: f32, epsilon: f32 },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        let in_unit = |name: &str, value: f32| {
            if (0.0..1.0).contains(&value) {
                Ok(())
            } else {
                Err(AnvilError::invalid_parameter(
                    name.to_string(),
                    format!("must lie in [0, 1), got {}", value),
                ))
            }
        };
        let positive = |name: &str, value: f32| {
            if value > 0.0 {
                Ok(())
            } else {
                Err(AnvilError::invalid_parameter(
                    name.to_string(),
                    format!("must be positive, got {}", value),
                ))
            }
        };
        match *self {
            OptimizerConfig::Sgd => Ok(()),
            OptimizerConfig::Adam { beta1, beta2, epsilon } => {
                in_unit("beta1", beta1)?;
                in_unit("beta2", beta2)?;
                positive("epsilon", epsilon)
            }
            OptimizerConfig::RmsProp { beta, epsilon } => {
                in_unit("beta", beta)?;
                positive("epsilon", epsilon)
            }
        }
    }

    pub fn build(&self) -> OptimizerWrapper {
        match *self {
            OptimizerConfig::Sgd => OptimizerWrapper::SGD(SGD::new()),
            OptimizerConfig::Adam { beta1, beta2, epsilon } => OptimizerWrapper::Adam(Adam::new(beta1, beta2, epsilon)),
            OptimizerConfig::RmsProp { beta, epsilon } => OptimizerWrapper::RMSProp(RMSProp::new(beta, epsilon)),
        }
    }
}

#[derive(Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
    RMSProp(RMSProp),
}

impl Optimizer for OptimizerWrapper {
    fn update(&mut self, param: ParamMut<'_>, learning_rate: f32) {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.update(param, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.update(param, learning_rate),
            OptimizerWrapper::RMSProp(optimizer) => optimizer.update(param, learning_rate),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Optimizer for SGD {
    fn update(&mut self, mut param: ParamMut<'_>, learning_rate: f32) {
        param.value.zip_mut_with(&param.grad, |w, &g| *w -= learning_rate * g);
    }
}

#[derive(Clone, Debug)]
struct AdamState {
    m: ArrayD<f32>,
    v: ArrayD<f32>,
    t: i32,
}

/// Adam with moment estimates kept per parameter id, so parameters can be
/// stepped in any order and shared blocks keep a single history.
#[derive(Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    state: HashMap<ParamId, AdamState>,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            state: HashMap::new(),
        }
    }

    /// Steps taken so far for the given parameter.
    pub fn step_count(&self, id: ParamId) -> usize {
        self.state.get(&id).map_or(0, |s| s.t as usize)
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn update(&mut self, mut param: ParamMut<'_>, learning_rate: f32) {
        let state = self.state.entry(param.id).or_insert_with(|| AdamState {
            m: ArrayD::zeros(param.value.raw_dim()),
            v: ArrayD::zeros(param.value.raw_dim()),
            t: 0,
        });
        state.t += 1;

        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let bias1 = 1.0 - beta1.powi(state.t);
        let bias2 = 1.0 - beta2.powi(state.t);

        Zip::from(&mut param.value)
            .and(&param.grad)
            .and(&mut state.m)
            .and(&mut state.v)
            .for_each(|w, &g, m, v| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *w -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
            });
    }
}

/// RMSProp optimizer
#[derive(Clone, Debug)]
pub struct RMSProp {
    pub beta: f32,
    pub epsilon: f32,
    mean_square: HashMap<ParamId, ArrayD<f32>>,
}

impl RMSProp {
    pub fn new(beta: f32, epsilon: f32) -> Self {
        RMSProp {
            beta,
            epsilon,
            mean_square: HashMap::new(),
        }
    }
}

impl Default for RMSProp {
    fn default() -> Self {
        Self::new(0.9, 1e-8)
    }
}

impl Optimizer for RMSProp {
    fn update(&mut self, mut param: ParamMut<'_>, learning_rate: f32) {
        let v = self
            .mean_square
            .entry(param.id)
            .or_insert_with(|| ArrayD::zeros(param.value.raw_dim()));
        let (beta, epsilon) = (self.beta, self.epsilon);

        Zip::from(&mut param.value)
            .and(&param.grad)
            .and(v)
            .for_each(|w, &g, v| {
                *v = beta * *v + (1.0 - beta) * g * g;
                *w -= learning_rate * g / (v.sqrt() + epsilon);
            });
    }
}
