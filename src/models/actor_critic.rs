use ndarray::{Array2, ArrayView2, Zip};
use std::rc::Rc;

use crate::error::{AnvilError, Result};
use super::actor::Actor;
use super::critic::Critic;
use super::distributions::ActionDistribution;
use super::heads::PolicyOutput;
use super::model::{polyak_blend, Model};

/// Point `critic` at the actor's encoder and/or torso, after checking the
/// shared blocks fit what the critic consumes. The critic's own blocks are dropped.
fn share_blocks(actor: &Actor, critic: &mut Critic, share_encoder: bool, share_torso: bool) -> Result<()> {
    let actor_encoder = actor.encoder.borrow();
    let actor_torso = actor.torso.borrow();

    if share_encoder {
        let critic_input = critic.encoder.borrow().input_size();
        if actor_encoder.input_size() != critic_input {
            return Err(AnvilError::sharing_conflict(
                "encoder".to_string(),
                format!(
                    "shared encoder consumes {} features but the critic is fed {}",
                    actor_encoder.input_size(),
                    critic_input
                ),
            ));
        }
        if !share_torso {
            let critic_torso_input = critic.torso.borrow().input_size();
            if actor_encoder.output_size() != critic_torso_input {
                return Err(AnvilError::sharing_conflict(
                    "encoder".to_string(),
                    format!(
                        "shared encoder produces {} features but the critic torso expects {}",
                        actor_encoder.output_size(),
                        critic_torso_input
                    ),
                ));
            }
        }
    }

    if share_torso {
        let critic_features = if share_encoder {
            actor_encoder.output_size()
        } else {
            critic.encoder.borrow().output_size()
        };
        if actor_torso.input_size() != critic_features {
            return Err(AnvilError::sharing_conflict(
                "torso".to_string(),
                format!(
                    "shared torso expects {} features but the critic encoder produces {}",
                    actor_torso.input_size(),
                    critic_features
                ),
            ));
        }
        let critic_head_input = critic.head.borrow().input_size();
        if actor_torso.output_size() != critic_head_input {
            return Err(AnvilError::sharing_conflict(
                "torso".to_string(),
                format!(
                    "shared torso produces {} features but the critic head expects {}",
                    actor_torso.output_size(),
                    critic_head_input
                ),
            ));
        }
    }

    if share_encoder {
        critic.encoder = Rc::clone(&actor.encoder);
    }
    if share_torso {
        critic.torso = Rc::clone(&actor.torso);
    }
    Ok(())
}

fn check_tau(polyak_tau: f32) -> Result<()> {
    if !(polyak_tau > 0.0 && polyak_tau <= 1.0) {
        return Err(AnvilError::invalid_parameter(
            "polyak_tau".to_string(),
            format!("must lie in (0, 1], got {}", polyak_tau),
        ));
    }
    Ok(())
}

/// An actor and a critic, optionally sharing their encoder and/or torso.
///
/// With a sharing flag set the two networks are no longer independent, so
/// [`actor`](Self::actor) and [`critic`](Self::critic) return `None` and the
/// composite is only reachable through its forward methods. Updaters see the
/// networks through the [`Model`] trait either way.
pub struct ActorCritic {
    actor: Actor,
    critic: Critic,
    share_encoder: bool,
    share_torso: bool,
}

impl ActorCritic {
    pub fn new(actor: Actor, mut critic: Critic, share_encoder: bool, share_torso: bool) -> Result<Self> {
        share_blocks(&actor, &mut critic, share_encoder, share_torso)?;
        Ok(ActorCritic {
            actor,
            critic,
            share_encoder,
            share_torso,
        })
    }

    pub fn shares_encoder(&self) -> bool {
        self.share_encoder
    }

    pub fn shares_torso(&self) -> bool {
        self.share_torso
    }

    fn is_shared(&self) -> bool {
        self.share_encoder || self.share_torso
    }

    /// The actor, when it is independent of the critic.
    pub fn actor(&self) -> Option<&Actor> {
        (!self.is_shared()).then_some(&self.actor)
    }

    /// The critic, when it is independent of the actor.
    pub fn critic(&self) -> Option<&Critic> {
        (!self.is_shared()).then_some(&self.critic)
    }

    pub fn set_actor(&mut self, actor: Actor) -> Result<()> {
        if self.is_shared() {
            return Err(AnvilError::sharing_conflict(
                "actor",
                "cannot replace the actor of a composite with shared blocks",
            ));
        }
        self.actor = actor;
        Ok(())
    }

    pub fn set_critic(&mut self, critic: Critic) -> Result<()> {
        if self.is_shared() {
            return Err(AnvilError::sharing_conflict(
                "critic",
                "cannot replace the critic of a composite with shared blocks",
            ));
        }
        self.critic = critic;
        Ok(())
    }

    pub fn forward(&self, observations: ArrayView2<f32>) -> Result<PolicyOutput> {
        self.actor.forward(observations)
    }

    pub fn get_action_distribution(&self, observations: ArrayView2<f32>) -> Result<ActionDistribution> {
        self.actor.get_action_distribution(observations)
    }

    pub fn forward_critic(&self, observations: ArrayView2<f32>, actions: Option<ArrayView2<f32>>) -> Result<Array2<f32>> {
        self.critic.forward(observations, actions)
    }

    /// Fresh-parameter copy with the same internal sharing and no handle in
    /// common with `self`.
    pub fn deep_copy(&self) -> Result<ActorCritic> {
        ActorCritic::new(
            self.actor.deep_copy(),
            self.critic.deep_copy(),
            self.share_encoder,
            self.share_torso,
        )
    }
}

impl Model for ActorCritic {
    fn policy_network(&self) -> &Actor {
        &self.actor
    }

    fn value_networks(&self) -> Vec<&Critic> {
        vec![&self.critic]
    }
}

/// An [`ActorCritic`] plus a frozen copy that tracks it by Polyak averaging.
pub struct ActorCriticWithTarget {
    live: ActorCritic,
    target: ActorCritic,
    polyak_tau: f32,
}

impl ActorCriticWithTarget {
    pub fn new(
        actor: Actor,
        critic: Critic,
        polyak_tau: f32,
        share_encoder: bool,
        share_torso: bool,
    ) -> Result<Self> {
        check_tau(polyak_tau)?;
        let live = ActorCritic::new(actor, critic, share_encoder, share_torso)?;
        let target = live.deep_copy()?;
        Ok(ActorCriticWithTarget { live, target, polyak_tau })
    }

    pub fn polyak_tau(&self) -> f32 {
        self.polyak_tau
    }

    pub fn live(&self) -> &ActorCritic {
        &self.live
    }

    /// Read-only handle on the target copy. It is deliberately not a [`Model`],
    /// so no gradient updater can step it.
    pub fn target(&self) -> TargetView<'_> {
        TargetView { target: &self.target }
    }

    pub(crate) fn target_model(&self) -> &ActorCritic {
        &self.target
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.live.actor()
    }

    pub fn critic(&self) -> Option<&Critic> {
        self.live.critic()
    }

    pub fn forward(&self, observations: ArrayView2<f32>) -> Result<PolicyOutput> {
        self.live.forward(observations)
    }

    pub fn get_action_distribution(&self, observations: ArrayView2<f32>) -> Result<ActionDistribution> {
        self.live.get_action_distribution(observations)
    }

    pub fn forward_critic(&self, observations: ArrayView2<f32>, actions: Option<ArrayView2<f32>>) -> Result<Array2<f32>> {
        self.live.forward_critic(observations, actions)
    }

    pub fn forward_target(&self, observations: ArrayView2<f32>) -> Result<PolicyOutput> {
        self.target.forward(observations)
    }

    pub fn forward_target_critic(
        &self,
        observations: ArrayView2<f32>,
        actions: Option<ArrayView2<f32>>,
    ) -> Result<Array2<f32>> {
        self.target.forward_critic(observations, actions)
    }

    /// Blend every target parameter toward its live counterpart.
    pub fn update_target(&mut self) -> Result<()> {
        polyak_blend(&self.live, &self.target, self.polyak_tau)
    }
}

impl Model for ActorCriticWithTarget {
    fn policy_network(&self) -> &Actor {
        self.live.policy_network()
    }

    fn value_networks(&self) -> Vec<&Critic> {
        self.live.value_networks()
    }
}

/// Inference and parameter reads on a target network.
#[derive(Clone, Copy)]
pub struct TargetView<'a> {
    target: &'a ActorCritic,
}

impl<'a> TargetView<'a> {
    pub fn forward(&self, observations: ArrayView2<f32>) -> Result<PolicyOutput> {
        self.target.forward(observations)
    }

    pub fn get_action_distribution(&self, observations: ArrayView2<f32>) -> Result<ActionDistribution> {
        self.target.get_action_distribution(observations)
    }

    pub fn forward_critic(&self, observations: ArrayView2<f32>, actions: Option<ArrayView2<f32>>) -> Result<Array2<f32>> {
        self.target.forward_critic(observations, actions)
    }

    /// Every parameter value, flattened in the order the live model visits its own.
    pub fn parameter_values(&self) -> Vec<f32> {
        let mut values = Vec::new();
        self.target.visit_parameters(&mut |p| values.extend(p.value.iter().cloned()));
        values
    }

    pub fn num_parameters(&self) -> usize {
        self.target.num_parameters()
    }

    pub fn shares_encoder(&self) -> bool {
        self.target.shares_encoder()
    }

    pub fn shares_torso(&self) -> bool {
        self.target.shares_torso()
    }
}

/// How twin critic estimates are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CriticReduction {
    /// Element-wise minimum, countering value overestimation.
    #[default]
    Min,
    Mean,
}

impl CriticReduction {
    fn reduce(&self, first: &Array2<f32>, second: &Array2<f32>) -> Array2<f32> {
        let mut out = Array2::zeros(first.raw_dim());
        Zip::from(&mut out).and(first).and(second).for_each(|o, &a, &b| {
            *o = match self {
                CriticReduction::Min => a.min(b),
                CriticReduction::Mean => 0.5 * (a + b),
            }
        });
        out
    }
}

struct TwinCritics<'a> {
    composite: &'a ActorCritic,
    critic2: &'a Critic,
}

impl Model for TwinCritics<'_> {
    fn policy_network(&self) -> &Actor {
        self.composite.policy_network()
    }

    fn value_networks(&self) -> Vec<&Critic> {
        vec![&self.composite.critic, self.critic2]
    }
}

/// Actor with two critics and target copies of all three networks.
pub struct TD3ActorCritic {
    live: ActorCritic,
    critic2: Critic,
    target: ActorCritic,
    target_critic2: Critic,
    polyak_tau: f32,
}

impl TD3ActorCritic {
    /// The second critic starts as an independent copy of `critic`.
    pub fn new(
        actor: Actor,
        critic: Critic,
        polyak_tau: f32,
        share_encoder: bool,
        share_torso: bool,
    ) -> Result<Self> {
        let critic2 = critic.deep_copy();
        Self::with_critics(actor, critic, critic2, polyak_tau, share_encoder, share_torso)
    }

    pub fn with_critics(
        actor: Actor,
        critic: Critic,
        mut critic2: Critic,
        polyak_tau: f32,
        share_encoder: bool,
        share_torso: bool,
    ) -> Result<Self> {
        check_tau(polyak_tau)?;
        share_blocks(&actor, &mut critic2, share_encoder, share_torso)?;
        let live = ActorCritic::new(actor, critic, share_encoder, share_torso)?;

        let target = live.deep_copy()?;
        let mut target_critic2 = critic2.deep_copy();
        share_blocks(&target.actor, &mut target_critic2, share_encoder, share_torso)?;

        Ok(TD3ActorCritic {
            live,
            critic2,
            target,
            target_critic2,
            polyak_tau,
        })
    }

    pub fn polyak_tau(&self) -> f32 {
        self.polyak_tau
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.live.actor()
    }

    /// Critic `index` (0 or 1), when critics are independent of the actor.
    pub fn critic_at(&self, index: usize) -> Option<&Critic> {
        if self.live.is_shared() {
            return None;
        }
        match index {
            0 => Some(&self.live.critic),
            1 => Some(&self.critic2),
            _ => None,
        }
    }

    fn live_critic(&self, index: usize) -> Result<&Critic> {
        match index {
            0 => Ok(&self.live.critic),
            1 => Ok(&self.critic2),
            _ => Err(AnvilError::invalid_parameter(
                "index".to_string(),
                format!("critic index must be 0 or 1, got {}", index),
            )),
        }
    }

    fn target_critic(&self, index: usize) -> Result<&Critic> {
        match index {
            0 => Ok(&self.target.critic),
            1 => Ok(&self.target_critic2),
            _ => Err(AnvilError::invalid_parameter(
                "index".to_string(),
                format!("critic index must be 0 or 1, got {}", index),
            )),
        }
    }

    pub fn forward(&self, observations: ArrayView2<f32>) -> Result<PolicyOutput> {
        self.live.forward(observations)
    }

    pub fn get_action_distribution(&self, observations: ArrayView2<f32>) -> Result<ActionDistribution> {
        self.live.get_action_distribution(observations)
    }

    /// Element-wise minimum of both critic estimates.
    pub fn forward_critic(&self, observations: ArrayView2<f32>, actions: Option<ArrayView2<f32>>) -> Result<Array2<f32>> {
        self.forward_critic_with(CriticReduction::Min, observations, actions)
    }

    pub fn forward_critic_with(
        &self,
        reduction: CriticReduction,
        observations: ArrayView2<f32>,
        actions: Option<ArrayView2<f32>>,
    ) -> Result<Array2<f32>> {
        let first = self.live.critic.forward(observations, actions)?;
        let second = self.critic2.forward(observations, actions)?;
        Ok(reduction.reduce(&first, &second))
    }

    pub fn forward_critic_at(
        &self,
        index: usize,
        observations: ArrayView2<f32>,
        actions: Option<ArrayView2<f32>>,
    ) -> Result<Array2<f32>> {
        self.live_critic(index)?.forward(observations, actions)
    }

    pub fn forward_target(&self, observations: ArrayView2<f32>) -> Result<PolicyOutput> {
        self.target.forward(observations)
    }

    pub fn forward_target_critic(
        &self,
        observations: ArrayView2<f32>,
        actions: Option<ArrayView2<f32>>,
    ) -> Result<Array2<f32>> {
        let first = self.target_critic(0)?.forward(observations, actions)?;
        let second = self.target_critic(1)?.forward(observations, actions)?;
        Ok(CriticReduction::Min.reduce(&first, &second))
    }

    pub fn forward_target_critic_at(
        &self,
        index: usize,
        observations: ArrayView2<f32>,
        actions: Option<ArrayView2<f32>>,
    ) -> Result<Array2<f32>> {
        self.target_critic(index)?.forward(observations, actions)
    }

    pub fn update_target(&mut self) -> Result<()> {
        let live = TwinCritics { composite: &self.live, critic2: &self.critic2 };
        let target = TwinCritics { composite: &self.target, critic2: &self.target_critic2 };
        polyak_blend(&live, &target, self.polyak_tau)
    }
}

impl Model for TD3ActorCritic {
    fn policy_network(&self) -> &Actor {
        self.live.policy_network()
    }

    fn value_networks(&self) -> Vec<&Critic> {
        vec![&self.live.critic, &self.critic2]
    }
}
