//! Actor and critic networks assembled from encoder, torso and head blocks.
//!
//! Blocks are held behind [`Shared`] handles. An [`ActorCritic`] built with a
//! sharing flag hands the actor's handle to the critic, so both networks read
//! and train the same parameters.

pub mod actor;
pub mod actor_critic;
pub mod critic;
pub mod distributions;
pub mod encoders;
pub mod heads;
pub mod model;
pub mod torsos;

pub use actor::{Actor, Shared};
pub use actor_critic::{ActorCritic, ActorCriticWithTarget, CriticReduction, TD3ActorCritic, TargetView};
pub use critic::Critic;
pub use distributions::{ActionDistribution, Categorical, DiagGaussian};
pub use encoders::Encoder;
pub use heads::{CriticHead, CriticHeadKind, HeadGradients, HeadOutput, PolicyHead, PolicyHeadKind, PolicyOutput};
pub use model::Model;
pub use torsos::Torso;
