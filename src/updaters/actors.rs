//! Policy objectives. Each steps only the parameters reachable from the actor.

use log::debug;
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::error::{AnvilError, Result};
use crate::models::{
    ActionDistribution, Actor, Critic, CriticHeadKind, HeadGradients, HeadOutput, Model, PolicyHeadKind, PolicyOutput,
};
use super::{
    ClippedPolicyBatch, GradientStep, ObservationBatch, ParameterScope, PolicyBatch, UpdateMetrics, Updater,
    UpdaterConfig,
};

fn require_distributional(updater: &str, actor: &Actor) -> Result<()> {
    let kind = actor.head_kind();
    if !kind.is_distributional() {
        return Err(AnvilError::action_head_mismatch(updater, "distributional", kind.name()));
    }
    Ok(())
}

fn distribution(output: HeadOutput) -> Result<ActionDistribution> {
    match output.into_policy_output() {
        PolicyOutput::Distribution(dist) => Ok(dist),
        PolicyOutput::Action(_) => Err(AnvilError::action_head_mismatch(
            "policy objective",
            "distributional",
            PolicyHeadKind::Deterministic.name(),
        )),
    }
}

/// First live critic, which must score continuous actions.
fn action_value_critic<'m>(updater: &str, model: &'m dyn Model) -> Result<&'m Critic> {
    let critic = model.value_networks().into_iter().next().ok_or_else(|| {
        AnvilError::invalid_parameter("model".to_string(), format!("{} needs a model with a critic", updater))
    })?;
    if critic.head_kind() != CriticHeadKind::ContinuousQ {
        return Err(AnvilError::invalid_parameter(
            "critic".to_string(),
            format!("{} needs a continuous Q critic, found {:?}", updater, critic.head_kind()),
        ));
    }
    Ok(critic)
}

/// REINFORCE: minimizes `-mean(log_prob(actions) * advantages)`.
#[derive(Clone, Debug)]
pub struct PolicyGradient {
    step: GradientStep,
}

impl PolicyGradient {
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        Ok(PolicyGradient { step: GradientStep::new(&config)? })
    }
}

impl Updater for PolicyGradient {
    type Batch = PolicyBatch;

    fn apply(&mut self, model: &dyn Model, batch: &PolicyBatch) -> Result<UpdateMetrics> {
        batch.validate()?;
        let actor = model.policy_network();
        require_distributional("PolicyGradient", actor)?;
        model.zero_grad();

        let (output, trace) = actor.forward_traced(batch.observations.view())?;
        let dist = distribution(output)?;
        let log_probs = dist.log_prob(batch.actions.view())?;

        let n = batch.advantages.len() as f32;
        let loss = -(&log_probs * &batch.advantages).sum() / n;
        let upstream = batch.advantages.mapv(|a| -a / n);
        let grads = dist.log_prob_gradients(batch.actions.view(), upstream.view())?;
        actor.backward(&trace, &grads);

        let metrics = self.step.apply(model, ParameterScope::Policy, loss)?;
        debug!("PolicyGradient: loss {:.5}, grad norm {:.5}", metrics.loss, metrics.grad_norm);
        Ok(metrics)
    }
}

/// Settings for [`ProximalPolicyClip`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProximalPolicyClipConfig {
    #[serde(flatten)]
    pub updater: UpdaterConfig,

    /// Half-width of the trust region around a ratio of one.
    pub clip_range: f32,
}

impl Default for ProximalPolicyClipConfig {
    fn default() -> Self {
        Self {
            updater: UpdaterConfig::default(),
            clip_range: 0.2,
        }
    }
}

impl ProximalPolicyClipConfig {
    pub fn updater(mut self, v: UpdaterConfig) -> Self {
        self.updater = v;
        self
    }

    pub fn clip_range(mut self, v: f32) -> Self {
        self.clip_range = v;
        self
    }
}

/// Clipped surrogate objective:
/// `-mean(min(r * A, clip(r, 1 - eps, 1 + eps) * A))` with
/// `r = exp(log_prob - old_log_prob)`.
#[derive(Clone, Debug)]
pub struct ProximalPolicyClip {
    step: GradientStep,
    clip_range: f32,
}

impl ProximalPolicyClip {
    pub fn new(config: ProximalPolicyClipConfig) -> Result<Self> {
        if !(config.clip_range > 0.0 && config.clip_range < 1.0) {
            return Err(AnvilError::invalid_parameter(
                "clip_range".to_string(),
                format!("must lie in (0, 1), got {}", config.clip_range),
            ));
        }
        Ok(ProximalPolicyClip {
            step: GradientStep::new(&config.updater)?,
            clip_range: config.clip_range,
        })
    }

    pub fn clip_range(&self) -> f32 {
        self.clip_range
    }
}

impl Updater for ProximalPolicyClip {
    type Batch = ClippedPolicyBatch;

    fn apply(&mut self, model: &dyn Model, batch: &ClippedPolicyBatch) -> Result<UpdateMetrics> {
        batch.validate()?;
        let actor = model.policy_network();
        require_distributional("ProximalPolicyClip", actor)?;
        model.zero_grad();

        let (output, trace) = actor.forward_traced(batch.observations.view())?;
        let dist = distribution(output)?;
        let log_probs = dist.log_prob(batch.actions.view())?;

        let n = batch.advantages.len() as f32;
        let (low, high) = (1.0 - self.clip_range, 1.0 + self.clip_range);
        let mut surrogate = 0.0;
        let mut upstream = Array1::zeros(log_probs.len());
        for i in 0..log_probs.len() {
            let ratio = (log_probs[i] - batch.old_log_probs[i]).exp();
            let advantage = batch.advantages[i];
            let unclipped = ratio * advantage;
            let clipped = ratio.clamp(low, high) * advantage;
            if unclipped <= clipped {
                surrogate += unclipped;
                // d(r * A)/d log_prob = r * A
                upstream[i] = -unclipped / n;
            } else {
                surrogate += clipped;
            }
        }
        let loss = -surrogate / n;

        let grads = dist.log_prob_gradients(batch.actions.view(), upstream.view())?;
        actor.backward(&trace, &grads);

        let metrics = self.step.apply(model, ParameterScope::Policy, loss)?;
        debug!("ProximalPolicyClip: loss {:.5}, grad norm {:.5}", metrics.loss, metrics.grad_norm);
        Ok(metrics)
    }
}

/// Minimizes `-mean(Q(s, mu(s)))`, differentiating through the critic's
/// action input into a deterministic actor.
#[derive(Clone, Debug)]
pub struct DeterministicPolicyGradient {
    step: GradientStep,
}

impl DeterministicPolicyGradient {
    pub fn new(config: UpdaterConfig) -> Result<Self> {
        Ok(DeterministicPolicyGradient { step: GradientStep::new(&config)? })
    }
}

impl Updater for DeterministicPolicyGradient {
    type Batch = ObservationBatch;

    fn apply(&mut self, model: &dyn Model, batch: &ObservationBatch) -> Result<UpdateMetrics> {
        batch.validate()?;
        let actor = model.policy_network();
        let kind = actor.head_kind();
        if kind != PolicyHeadKind::Deterministic {
            return Err(AnvilError::action_head_mismatch(
                "DeterministicPolicyGradient",
                PolicyHeadKind::Deterministic.name(),
                kind.name(),
            ));
        }
        let critic = action_value_critic("DeterministicPolicyGradient", model)?;
        model.zero_grad();

        let (output, actor_trace) = actor.forward_traced(batch.observations.view())?;
        let actions = match output {
            HeadOutput::Action(actions) => actions,
            _ => {
                return Err(AnvilError::action_head_mismatch(
                    "DeterministicPolicyGradient",
                    PolicyHeadKind::Deterministic.name(),
                    kind.name(),
                ))
            }
        };
        let (values, critic_trace) = critic.forward_traced(batch.observations.view(), Some(actions.view()))?;

        let n = values.nrows() as f32;
        let loss = -values.sum() / n;
        let value_grads = Array2::from_elem(values.raw_dim(), -1.0 / n);
        let action_grads = critic.backward_to_actions(&critic_trace, value_grads.view())?;
        actor.backward(&actor_trace, &HeadGradients { output: action_grads, log_std: None });

        let metrics = self.step.apply(model, ParameterScope::Policy, loss)?;
        debug!("DeterministicPolicyGradient: loss {:.5}, grad norm {:.5}", metrics.loss, metrics.grad_norm);
        Ok(metrics)
    }
}

/// Settings for [`SoftPolicyGradient`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SoftPolicyGradientConfig {
    #[serde(flatten)]
    pub updater: UpdaterConfig,

    /// Weight of the log-probability term (SAC alpha).
    pub entropy_coefficient: f32,
}

impl Default for SoftPolicyGradientConfig {
    fn default() -> Self {
        Self {
            updater: UpdaterConfig::default(),
            entropy_coefficient: 0.2,
        }
    }
}

impl SoftPolicyGradientConfig {
    pub fn updater(mut self, v: UpdaterConfig) -> Self {
        self.updater = v;
        self
    }

    pub fn entropy_coefficient(mut self, v: f32) -> Self {
        self.entropy_coefficient = v;
        self
    }
}

/// Minimizes `mean(alpha * log_prob(a) - Q(s, a))` for reparameterized
/// samples `a = loc + scale * eps` from a diagonal Gaussian actor.
#[derive(Clone, Debug)]
pub struct SoftPolicyGradient {
    step: GradientStep,
    entropy_coefficient: f32,
    rng: StdRng,
}

impl SoftPolicyGradient {
    pub fn new(config: SoftPolicyGradientConfig) -> Result<Self> {
        if !(config.entropy_coefficient >= 0.0) {
            return Err(AnvilError::invalid_parameter(
                "entropy_coefficient".to_string(),
                format!("must be non-negative, got {}", config.entropy_coefficient),
            ));
        }
        Ok(SoftPolicyGradient {
            step: GradientStep::new(&config.updater)?,
            entropy_coefficient: config.entropy_coefficient,
            rng: StdRng::from_entropy(),
        })
    }

    /// Fix the noise stream used for action sampling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl Updater for SoftPolicyGradient {
    type Batch = ObservationBatch;

    fn apply(&mut self, model: &dyn Model, batch: &ObservationBatch) -> Result<UpdateMetrics> {
        batch.validate()?;
        let actor = model.policy_network();
        let kind = actor.head_kind();
        if kind != PolicyHeadKind::DiagGaussian {
            return Err(AnvilError::action_head_mismatch(
                "SoftPolicyGradient",
                PolicyHeadKind::DiagGaussian.name(),
                kind.name(),
            ));
        }
        let critic = action_value_critic("SoftPolicyGradient", model)?;
        model.zero_grad();

        let (output, actor_trace) = actor.forward_traced(batch.observations.view())?;
        let (loc, log_std) = match output {
            HeadOutput::Gaussian { loc, log_std } => (loc, log_std),
            _ => {
                return Err(AnvilError::action_head_mismatch(
                    "SoftPolicyGradient",
                    PolicyHeadKind::DiagGaussian.name(),
                    kind.name(),
                ))
            }
        };
        let scale = log_std.mapv(f32::exp);
        let noise: Array2<f32> = Array2::random_using(loc.raw_dim(), StandardNormal, &mut self.rng);
        let actions = &loc + &(&noise * &scale);

        // log N(a; loc, scale) with a - loc = scale * eps
        let half_log_2pi = 0.5 * (2.0 * PI).ln();
        let log_probs = noise.map_axis(Axis(1), |eps| {
            eps.iter()
                .zip(log_std.iter())
                .map(|(&e, &ls)| -0.5 * e * e - ls - half_log_2pi)
                .sum::<f32>()
        });

        let (values, critic_trace) = critic.forward_traced(batch.observations.view(), Some(actions.view()))?;
        let n = values.nrows() as f32;
        let alpha = self.entropy_coefficient;
        let loss = (alpha * log_probs.sum() - values.sum()) / n;

        let value_grads = Array2::from_elem(values.raw_dim(), -1.0 / n);
        let action_grads = critic.backward_to_actions(&critic_trace, value_grads.view())?;

        // Actions move with both loc and log_std; log_prob only sees log_std directly.
        let mut d_log_std = Array1::from_elem(log_std.len(), -alpha);
        for ((i, j), &g) in action_grads.indexed_iter() {
            d_log_std[j] += g * scale[j] * noise[[i, j]];
        }
        actor.backward(
            &actor_trace,
            &HeadGradients {
                output: action_grads,
                log_std: Some(d_log_std),
            },
        );

        let metrics = self.step.apply(model, ParameterScope::Policy, loss)?;
        debug!(
            "SoftPolicyGradient: loss {:.5}, grad norm {:.5}, clipped {}",
            metrics.loss, metrics.grad_norm, metrics.clipped
        );
        Ok(metrics)
    }
}
