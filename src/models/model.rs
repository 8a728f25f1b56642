use std::collections::HashSet;

use crate::error::{AnvilError, Result};
use crate::layers::ParamMut;
use super::actor::Actor;
use super::critic::Critic;

/// The surface gradient updaters work against.
///
/// Every composite exposes its policy network and its live value networks.
/// Parameter visits are deduplicated by parameter id, so a block shared
/// between actor and critic is seen once.
pub trait Model {
    fn policy_network(&self) -> &Actor;

    /// Live critics in order. Target copies are never listed.
    fn value_networks(&self) -> Vec<&Critic>;

    fn visit_parameters(&self, f: &mut dyn FnMut(ParamMut<'_>)) {
        let mut seen = HashSet::new();
        let mut unique = |p: ParamMut<'_>| {
            if seen.insert(p.id) {
                f(p);
            }
        };
        self.policy_network().visit_parameters(&mut unique);
        for critic in self.value_networks() {
            critic.visit_parameters(&mut unique);
        }
    }

    /// Parameters reachable from the policy network.
    fn visit_policy_parameters(&self, f: &mut dyn FnMut(ParamMut<'_>)) {
        let mut seen = HashSet::new();
        self.policy_network().visit_parameters(&mut |p| {
            if seen.insert(p.id) {
                f(p);
            }
        });
    }

    /// Parameters reachable from any value network, shared ones included.
    fn visit_value_parameters(&self, f: &mut dyn FnMut(ParamMut<'_>)) {
        let mut seen = HashSet::new();
        let mut unique = |p: ParamMut<'_>| {
            if seen.insert(p.id) {
                f(p);
            }
        };
        for critic in self.value_networks() {
            critic.visit_parameters(&mut unique);
        }
    }

    fn zero_grad(&self) {
        self.visit_parameters(&mut |mut p| p.grad.fill(0.0));
    }

    fn num_parameters(&self) -> usize {
        let mut count = 0;
        self.visit_parameters(&mut |p| count += p.value.len());
        count
    }
}

impl Model for Actor {
    fn policy_network(&self) -> &Actor {
        self
    }

    fn value_networks(&self) -> Vec<&Critic> {
        Vec::new()
    }
}

/// `target <- tau * live + (1 - tau) * target`, parameter by parameter.
///
/// Both models must have the same structure and the same internal sharing so
/// that their deduplicated visit orders line up.
pub(crate) fn polyak_blend(live: &dyn Model, target: &dyn Model, tau: f32) -> Result<()> {
    let mut sources = Vec::new();
    live.visit_parameters(&mut |p| sources.push(p.value.to_owned()));
    let expected = sources.len();

    let mut sources = sources.into_iter();
    let mut visited = 0;
    let mut mismatch = false;
    target.visit_parameters(&mut |mut p| {
        visited += 1;
        match sources.next() {
            Some(source) if source.shape() == p.value.shape() => {
                p.value.zip_mut_with(&source, |t, &s| *t = tau * s + (1.0 - tau) * *t);
            }
            _ => mismatch = true,
        }
    });

    if mismatch || visited != expected {
        return Err(AnvilError::dimension_mismatch(
            format!("{} target parameters matching the live network", expected),
            format!("{} parameters", visited),
        ));
    }
    Ok(())
}
