use ndarray::{Array2, ArrayView2};
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{AnvilError, Result};
use crate::layers::{DenseTrace, ParamMut, Parameterized};
use crate::network::MlpTrace;
use super::distributions::ActionDistribution;
use super::encoders::Encoder;
use super::heads::{HeadGradients, HeadOutput, PolicyHead, PolicyHeadKind, PolicyOutput};
use super::torsos::Torso;

/// Reference-counted handle to a building block. Two networks holding clones
/// of the same handle share one set of parameters.
pub type Shared<T> = Rc<RefCell<T>>;

pub(crate) fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Everything a traced actor forward pass recorded.
pub struct ActorTrace {
    encoder: MlpTrace,
    torso: MlpTrace,
    head: DenseTrace,
}

/// Policy network: `head(torso(encoder(observation)))`.
pub struct Actor {
    pub(crate) encoder: Shared<Encoder>,
    pub(crate) torso: Shared<Torso>,
    pub(crate) head: Shared<PolicyHead>,
}

impl Actor {
    /// Compose an actor, failing when consecutive stage sizes disagree.
    pub fn new(encoder: Encoder, torso: Torso, head: PolicyHead) -> Result<Self> {
        if encoder.output_size() != torso.input_size() {
            return Err(AnvilError::shape_configuration(
                "actor torso input",
                encoder.output_size(),
                torso.input_size(),
            ));
        }
        if torso.output_size() != head.input_size() {
            return Err(AnvilError::shape_configuration(
                "actor head input",
                torso.output_size(),
                head.input_size(),
            ));
        }
        Ok(Actor {
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

    pub fn head(&self) -> &Shared<PolicyHead> {
        &self.head
    }

    pub fn head_kind(&self) -> PolicyHeadKind {
        self.head.borrow().kind()
    }

    pub fn observation_size(&self) -> usize {
        self.encoder.borrow().input_size()
    }

    /// Action dimensionality, or number of discrete actions.
    pub fn action_size(&self) -> usize {
        self.head.borrow().output_size()
    }

    fn check_observations(&self, observations: ArrayView2<f32>) -> Result<()> {
        let expected = self.observation_size();
        if observations.ncols() != expected {
            return Err(AnvilError::dimension_mismatch(
                format!("observations with {} features", expected),
                format!("{} features", observations.ncols()),
            ));
        }
        Ok(())
    }

    /// Evaluate the policy for a batch of observations (one per row).
    pub fn forward(&self, observations: ArrayView2<f32>) -> Result<PolicyOutput> {
        self.check_observations(observations)?;
        let features = self.encoder.borrow().forward(observations);
        let hidden = self.torso.borrow().forward(features.view());
        let output = self.head.borrow().forward(hidden.view());
        Ok(output.into_policy_output())
    }

    pub fn get_action_distribution(&self, observations: ArrayView2<f32>) -> Result<ActionDistribution> {
        match self.forward(observations)? {
            PolicyOutput::Distribution(dist) => Ok(dist),
            PolicyOutput::Action(_) => Err(AnvilError::action_head_mismatch(
                "get_action_distribution",
                "distributional",
                PolicyHeadKind::Deterministic.name(),
            )),
        }
    }

    pub(crate) fn forward_traced(&self, observations: ArrayView2<f32>) -> Result<(HeadOutput, ActorTrace)> {
        self.check_observations(observations)?;
        let (features, encoder) = self.encoder.borrow().forward_traced(observations);
        let (hidden, torso) = self.torso.borrow().forward_traced(features.view());
        let (output, head) = self.head.borrow().forward_traced(hidden.view());
        Ok((output, ActorTrace { encoder, torso, head }))
    }

    /// Backpropagate head gradients through head, torso and encoder.
    pub(crate) fn backward(&self, trace: &ActorTrace, grads: &HeadGradients) -> Array2<f32> {
        let hidden_grads = self.head.borrow_mut().backward(&trace.head, grads);
        let feature_grads = self.torso.borrow_mut().backward(&trace.torso, hidden_grads.view());
        self.encoder.borrow_mut().backward(&trace.encoder, feature_grads.view())
    }

    /// Visit encoder, torso and head parameters in that order.
    pub fn visit_parameters(&self, f: &mut dyn FnMut(ParamMut<'_>)) {
        self.encoder.borrow_mut().visit_parameters(f);
        self.torso.borrow_mut().visit_parameters(f);
        self.head.borrow_mut().visit_parameters(f);
    }

    /// Independent copy with fresh parameter identities and no shared handles.
    pub fn deep_copy(&self) -> Actor {
        Actor {
            encoder: shared(self.encoder.borrow().clone()),
            torso: shared(self.torso.borrow().clone()),
            head: shared(self.head.borrow().clone()),
        }
    }
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("observation_size", &self.observation_size())
            .field("action_size", &self.action_size())
            .field("head", &self.head_kind())
            .finish()
    }
}
