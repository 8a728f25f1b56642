//! Update rules that consume a model plus a batch of data and step its parameters.
//!
//! Gradient updaters implement [`Updater`]: each zeroes every gradient of the
//! model, records a traced forward pass, backpropagates its objective, clips the
//! global gradient norm to `max_grad` and applies one optimizer step to the
//! parameters it owns. Policy updaters step the actor, regression updaters step
//! the critics. A block shared between the two is stepped by both.
//!
//! Population updaters live in [`random_search`] and drive candidate
//! generations from externally computed rewards.

pub mod actors;
pub mod critics;
pub mod random_search;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{AnvilError, Result};
use crate::layers::ParamMut;
use crate::models::Model;
use crate::optimizer::{GradientClipper, Optimizer, OptimizerConfig, OptimizerWrapper};

pub use actors::{
    DeterministicPolicyGradient, PolicyGradient, ProximalPolicyClip, ProximalPolicyClipConfig, SoftPolicyGradient,
    SoftPolicyGradientConfig,
};
pub use critics::{QRegression, ValueRegression};
pub use random_search::{EvolutionaryUpdater, GeneticUpdater};

/// What a gradient update reports.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateMetrics {
    /// Objective value before the step.
    pub loss: f32,
    /// Global gradient norm before clipping.
    pub grad_norm: f32,
    /// Whether clipping rescaled the gradients.
    pub clipped: bool,
}

/// A gradient-based update rule.
pub trait Updater {
    /// Data one update consumes.
    type Batch;

    /// Apply one optimizer step to `model` for `batch`.
    fn apply(&mut self, model: &dyn Model, batch: &Self::Batch) -> Result<UpdateMetrics>;
}

/// Settings shared by every gradient updater.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Optimizer step size.
    pub learning_rate: f32,

    /// Upper bound on the global gradient norm.
    pub max_grad: f32,

    /// Optimizer used for the step.
    pub optimizer: OptimizerConfig,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            max_grad: 0.5,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl UpdaterConfig {
    pub fn learning_rate(mut self, v: f32) -> Self {
        self.learning_rate = v;
        self
    }

    pub fn max_grad(mut self, v: f32) -> Self {
        self.max_grad = v;
        self
    }

    pub fn optimizer(mut self, v: OptimizerConfig) -> Self {
        self.optimizer = v;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(AnvilError::invalid_parameter(
                "learning_rate".to_string(),
                format!("must be positive, got {}", self.learning_rate),
            ));
        }
        if !(self.max_grad > 0.0) {
            return Err(AnvilError::invalid_parameter(
                "max_grad".to_string(),
                format!("must be positive, got {}", self.max_grad),
            ));
        }
        self.optimizer.validate()
    }
}

fn check_rows(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(AnvilError::dimension_mismatch(
            format!("{} {}", expected, what),
            format!("{}", actual),
        ));
    }
    Ok(())
}

fn check_observations(observations: &Array2<f32>) -> Result<usize> {
    if observations.nrows() == 0 {
        return Err(AnvilError::invalid_parameter("observations", "batch is empty"));
    }
    Ok(observations.nrows())
}

/// Observations, taken actions and their advantages.
#[derive(Clone, Debug)]
pub struct PolicyBatch {
    pub observations: Array2<f32>,
    pub actions: Array2<f32>,
    pub advantages: Array1<f32>,
}

impl PolicyBatch {
    pub fn new(observations: Array2<f32>, actions: Array2<f32>, advantages: Array1<f32>) -> Result<Self> {
        let batch = PolicyBatch { observations, actions, advantages };
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> Result<()> {
        let n = check_observations(&self.observations)?;
        check_rows("action rows", n, self.actions.nrows())?;
        check_rows("advantages", n, self.advantages.len())
    }
}

/// A [`PolicyBatch`] plus the log probabilities under the behaviour policy.
#[derive(Clone, Debug)]
pub struct ClippedPolicyBatch {
    pub observations: Array2<f32>,
    pub actions: Array2<f32>,
    pub advantages: Array1<f32>,
    pub old_log_probs: Array1<f32>,
}

impl ClippedPolicyBatch {
    pub fn new(
        observations: Array2<f32>,
        actions: Array2<f32>,
        advantages: Array1<f32>,
        old_log_probs: Array1<f32>,
    ) -> Result<Self> {
        let batch = ClippedPolicyBatch { observations, actions, advantages, old_log_probs };
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> Result<()> {
        let n = check_observations(&self.observations)?;
        check_rows("action rows", n, self.actions.nrows())?;
        check_rows("advantages", n, self.advantages.len())?;
        check_rows("old log probabilities", n, self.old_log_probs.len())
    }
}

/// Observations only, for objectives that act through the critic.
#[derive(Clone, Debug)]
pub struct ObservationBatch {
    pub observations: Array2<f32>,
}

impl ObservationBatch {
    pub fn new(observations: Array2<f32>) -> Result<Self> {
        let batch = ObservationBatch { observations };
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> Result<()> {
        check_observations(&self.observations).map(|_| ())
    }
}

/// Observations and their regression targets.
#[derive(Clone, Debug)]
pub struct ValueBatch {
    pub observations: Array2<f32>,
    pub returns: Array1<f32>,
}

impl ValueBatch {
    pub fn new(observations: Array2<f32>, returns: Array1<f32>) -> Result<Self> {
        let batch = ValueBatch { observations, returns };
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> Result<()> {
        let n = check_observations(&self.observations)?;
        check_rows("returns", n, self.returns.len())
    }
}

/// Observation-action pairs and their regression targets.
///
/// `actions` may be left out when every critic ignores them (value heads) or
/// returns a single value per row.
#[derive(Clone, Debug)]
pub struct QBatch {
    pub observations: Array2<f32>,
    pub actions: Option<Array2<f32>>,
    pub returns: Array1<f32>,
}

impl QBatch {
    pub fn new(observations: Array2<f32>, actions: Array2<f32>, returns: Array1<f32>) -> Result<Self> {
        let batch = QBatch { observations, actions: Some(actions), returns };
        batch.validate()?;
        Ok(batch)
    }

    pub fn without_actions(observations: Array2<f32>, returns: Array1<f32>) -> Result<Self> {
        let batch = QBatch { observations, actions: None, returns };
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> Result<()> {
        let n = check_observations(&self.observations)?;
        if let Some(actions) = &self.actions {
            check_rows("action rows", n, actions.nrows())?;
        }
        check_rows("returns", n, self.returns.len())
    }
}

/// Which parameters an updater is allowed to step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ParameterScope {
    Policy,
    Value,
}

impl ParameterScope {
    fn visit(self, model: &dyn Model, f: &mut dyn FnMut(ParamMut<'_>)) {
        match self {
            ParameterScope::Policy => model.visit_policy_parameters(f),
            ParameterScope::Value => model.visit_value_parameters(f),
        }
    }
}

/// Clipping plus optimizer state for one updater.
#[derive(Clone, Debug)]
pub(crate) struct GradientStep {
    learning_rate: f32,
    clipper: GradientClipper,
    optimizer: OptimizerWrapper,
}

impl GradientStep {
    pub(crate) fn new(config: &UpdaterConfig) -> Result<Self> {
        config.validate()?;
        Ok(GradientStep {
            learning_rate: config.learning_rate,
            clipper: GradientClipper::ClipByGlobalNorm { max_norm: config.max_grad },
            optimizer: config.optimizer.build(),
        })
    }

    /// Clip the accumulated gradients in `scope` and step them.
    pub(crate) fn apply(&mut self, model: &dyn Model, scope: ParameterScope, loss: f32) -> Result<UpdateMetrics> {
        if !loss.is_finite() {
            return Err(AnvilError::NumericalError(format!("non-finite loss {}", loss)));
        }
        let visit = |f: &mut dyn FnMut(ParamMut<'_>)| scope.visit(model, f);
        let (grad_norm, clipped) = self.clipper.clip(&visit);
        if !grad_norm.is_finite() {
            return Err(AnvilError::NumericalError(format!("non-finite gradient norm {}", grad_norm)));
        }

        let learning_rate = self.learning_rate;
        let optimizer = &mut self.optimizer;
        visit(&mut |p| optimizer.update(p, learning_rate));

        Ok(UpdateMetrics { loss, grad_norm, clipped })
    }
}
