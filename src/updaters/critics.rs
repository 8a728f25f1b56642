use log::debug;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{AnvilError, Result};
use crate::models::{Critic, CriticHeadKind, Model};
use super::{GradientStep, ParameterScope, QBatch, UpdateMetrics, Updater, UpdaterConfig, ValueBatch};

/// Backpropagate `mean((prediction - returns)^2)` through `critic` and return the loss.
fn regress(
    critic: &Critic,
    observations: ArrayView2<f32>,
    actions: Option<ArrayView2<f32>>,
    returns: &Array1<f32>,
) -> Result<f32> {
    let (predictions, trace) = critic.forward_traced(observations, actions)?;
    if predictions.ncols() != 1 {
        return Err(AnvilError::dimension_mismatch(
            "one estimate per observation".to_string(),
            format!("{} columns", predictions.ncols()),
        ));
    }
    let diff = &predictions.column(0) - returns;
    let n = diff.len() as f32;
    let loss = diff.mapv(|d| d * d).sum() / n;
    let grads: Array2<f32> = diff.mapv(|d| 2.0 * d / n).insert_axis(Axis(1));
    critic.backward(&trace, grads.view());
    Ok(loss)
}

fn live_critics<'m>(updater: &str, model: &'m dyn Model) -> Result<Vec<&'m Critic>> {
    let critics = model.value_networks();
    if critics.is_empty() {
        return Err(AnvilError::invalid_parameter(
            "model".to_string(),
            format!("{} needs a model with a critic", updater),
        ));
    }
    Ok(critics)
}

/// Fits state values: `mean((V(s) - R)^2)`, summed over every live critic.
#[derive(Clone, Debug)]
pub struct ValueRegression {
    step: GradientStep,
}

impl ValueRegression {
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        Ok(ValueRegression { step: GradientStep::new(&config)? })
    }
}

impl Updater for ValueRegression {
    type Batch = ValueBatch;

    fn apply(&mut self, model: &dyn Model, batch: &ValueBatch) -> Result<UpdateMetrics> {
        batch.validate()?;
        let critics = live_critics("ValueRegression", model)?;
        if let Some(critic) = critics.iter().find(|c| c.head_kind() != CriticHeadKind::Value) {
            return Err(AnvilError::invalid_parameter(
                "critic".to_string(),
                format!("ValueRegression needs value heads, found {:?}", critic.head_kind()),
            ));
        }
        model.zero_grad();

        let mut loss = 0.0;
        for critic in critics {
            loss += regress(critic, batch.observations.view(), None, &batch.returns)?;
        }

        let metrics = self.step.apply(model, ParameterScope::Value, loss)?;
        debug!("ValueRegression: loss {:.5}, grad norm {:.5}", metrics.loss, metrics.grad_norm);
        Ok(metrics)
    }
}

/// Fits action values: `mean((Q(s, a) - R)^2)`, summed over every live critic.
/// Value critics are fitted on the observations alone.
#[derive(Clone, Debug)]
pub struct QRegression {
    step: GradientStep,
}

impl QRegression {
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        Ok(QRegression { step: GradientStep::new(&config)? })
    }
}

impl Updater for QRegression {
    type Batch = QBatch;

    fn apply(&mut self, model: &dyn Model, batch: &QBatch) -> Result<UpdateMetrics> {
        batch.validate()?;
        let critics = live_critics("QRegression", model)?;
        model.zero_grad();

        // Value heads ignore the actions, so they regress like ValueRegression.
        let actions = batch.actions.as_ref().map(|a| a.view());
        let mut loss = 0.0;
        for critic in critics {
            loss += regress(critic, batch.observations.view(), actions, &batch.returns)?;
        }

        let metrics = self.step.apply(model, ParameterScope::Value, loss)?;
        debug!("QRegression: loss {:.5}, grad norm {:.5}", metrics.loss, metrics.grad_norm);
        Ok(metrics)
    }
}
