//! Genetic operators: selection, crossover and mutation strategies.
//!
//! Every operator has the same shape, `(population, fitness, context) ->
//! population`, so a generation is just three operators applied in turn.
//! Closures with that signature are operators too.

pub mod crossover;
pub mod mutation;
pub mod selection;

use ndarray::ArrayView1;
use rand::RngCore;

use crate::error::Result;
use crate::types::{ActionSpace, Population};

pub use crossover::{OnePointCrossover, UniformCrossover};
pub use mutation::{GaussianMutation, UniformMutation};
pub use selection::{RouletteSelection, TournamentSelection};

/// What an operator may consult besides the population itself.
pub struct OperatorContext<'a> {
    pub space: &'a ActionSpace,
    pub rng: &'a mut dyn RngCore,
}

impl<'a> OperatorContext<'a> {
    pub fn new(space: &'a ActionSpace, rng: &'a mut dyn RngCore) -> Self {
        OperatorContext { space, rng }
    }
}

pub trait GeneticOperator {
    fn apply(&self, population: &Population, fitness: ArrayView1<f64>, ctx: &mut OperatorContext<'_>) -> Result<Population>;
}

impl<F> GeneticOperator for F
where
    F: Fn(&Population, ArrayView1<f64>, &mut OperatorContext<'_>) -> Result<Population>,
{
    fn apply(&self, population: &Population, fitness: ArrayView1<f64>, ctx: &mut OperatorContext<'_>) -> Result<Population> {
        self(population, fitness, ctx)
    }
}

/// Pins a closure to the operator signature so its argument types need no annotations.
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(&Population, ArrayView1<f64>, &mut OperatorContext<'_>) -> Result<Population>,
{
    f
}

/// Leaves the population unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl GeneticOperator for Identity {
    fn apply(&self, population: &Population, _fitness: ArrayView1<f64>, _ctx: &mut OperatorContext<'_>) -> Result<Population> {
        Ok(population.clone())
    }
}
