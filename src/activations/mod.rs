//! # Activation Functions Module
//!
//! Element-wise non-linearities applied at the end of every dense layer in an
//! encoder, torso or head.
//!
//! ## Available Activations
//!
//! - **ReLU**: `max(0, x)`
//! - **Tanh**: Hyperbolic tangent, outputs between -1 and 1. Default for torsos
//!   and deterministic policy heads
//! - **Sigmoid**: `1 / (1 + e^(-x))`
//! - **Linear**: Identity function, used by value and Q heads
//! - **LeakyReLU** and **ELU**: ReLU variants that keep a gradient for negative inputs
//!
//! Activations are applied to a batch (`Array2`, one row per sample). The
//! derivative is evaluated on the stored pre-activation values during the
//! backward pass.
//!
//! ```rust
//! use anvil::activations::Activation;
//! use ndarray::array;
//!
//! let mut data = array![[1.0, -0.5, 0.0, 2.0]];
//! Activation::Relu.apply_batch(&mut data);
//! assert_eq!(data, array![[1.0, 0.0, 0.0, 2.0]]);
//! ```

pub mod functions;

pub use functions::Activation;
