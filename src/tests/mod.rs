pub mod test_random_search;
pub mod test_updaters;

use crate::models::{Actor, Critic, CriticHead, Encoder, PolicyHead, Torso};

/// Gaussian policy over 2 observation features and 1 action dimension.
pub(crate) fn gaussian_actor() -> Actor {
    Actor::new(Encoder::identity(2), Torso::mlp(&[2, 2]).unwrap(), PolicyHead::diag_gaussian(2, 1)).unwrap()
}

pub(crate) fn deterministic_actor() -> Actor {
    Actor::new(Encoder::identity(2), Torso::mlp(&[2, 2]).unwrap(), PolicyHead::deterministic(2, 1, None)).unwrap()
}

pub(crate) fn value_critic() -> Critic {
    Critic::new(Encoder::identity(2), Torso::mlp(&[2, 2]).unwrap(), CriticHead::value(2, None)).unwrap()
}

/// Q critic reading `[observation, action]`, 3 features in total.
pub(crate) fn continuous_critic() -> Critic {
    Critic::new(
        Encoder::mlp(3, 2).unwrap(),
        Torso::mlp(&[2, 2]).unwrap(),
        CriticHead::continuous_q(2, None),
    )
    .unwrap()
}
