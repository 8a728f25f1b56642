//! # Anvil - Actor/Critic Composition and Parameter Updaters
//!
//! Anvil is the model and update layer of a reinforcement-learning toolkit.
//! It assembles policy ("actor") and value ("critic") networks from encoder,
//! torso and head blocks, lets an actor and critic share blocks, and provides
//! the update rules that change their parameters.
//!
//! ## Key Features
//!
//! - **Composition**: Actor, Critic, ActorCritic, target-network and twin-critic variants
//! - **Sharing**: encoder/torso aliasing through reference-counted handles
//! - **Policy updaters**: REINFORCE, clipped PPO, deterministic and soft policy gradients
//! - **Critic updaters**: value and action-value regression
//! - **Population search**: evolution strategies and genetic algorithms
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use anvil::models::{Actor, ActorCritic, Critic, CriticHead, Encoder, PolicyHead, Torso};
//! use anvil::updaters::{PolicyBatch, PolicyGradient, Updater, UpdaterConfig};
//! use ndarray::{array, Array2};
//!
//! let actor = Actor::new(Encoder::identity(2), Torso::mlp(&[2, 16])?, PolicyHead::diag_gaussian(16, 1))?;
//! let critic = Critic::new(Encoder::identity(2), Torso::mlp(&[2, 16])?, CriticHead::value(16, None))?;
//! let model = ActorCritic::new(actor, critic, false, true)?;
//!
//! let batch = PolicyBatch::new(array![[0.5, -0.5]], Array2::zeros((1, 1)), array![1.0])?;
//! let mut updater = PolicyGradient::new(UpdaterConfig::default())?;
//! let metrics = updater.apply(&model, &batch)?;
//! println!("loss {}", metrics.loss);
//! # Ok::<(), anvil::error::AnvilError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Activation functions (ReLU, Tanh, etc.)
//! - [`error`] - Error types and result handling
//! - [`layers`] - Dense layers, parameters and initialization
//! - [`models`] - Building blocks and actor/critic composites
//! - [`network`] - Dense layer stacks
//! - [`operators`] - Selection, crossover and mutation strategies
//! - [`optimizer`] - Optimization algorithms and gradient clipping
//! - [`types`] - Action spaces and candidate populations
//! - [`updaters`] - Gradient and population-based update rules

pub mod activations;
pub mod error;
pub mod layers;
pub mod models;
pub mod network;
pub mod operators;
pub mod optimizer;
pub mod types;
pub mod updaters;

#[cfg(test)]
mod tests;
