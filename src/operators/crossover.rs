use ndarray::{Array2, ArrayView1};
use rand::Rng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Population;
use super::{GeneticOperator, OperatorContext};

/// Walk consecutive pairs `(0, 1), (2, 3), ...` and let `mix` exchange genes
/// between them. An odd last member passes through.
fn pairwise<T, F>(members: &Array2<T>, rng: &mut dyn RngCore, mut mix: F) -> Array2<T>
where
    T: Copy,
    F: FnMut(&mut dyn RngCore, usize, &mut [T], &mut [T]),
{
    let mut offspring = members.clone();
    let dim = members.ncols();
    for pair in (0..members.nrows() / 2).map(|k| 2 * k) {
        let mut first: Vec<T> = offspring.row(pair).to_vec();
        let mut second: Vec<T> = offspring.row(pair + 1).to_vec();
        mix(&mut *rng, dim, &mut first, &mut second);
        for j in 0..dim {
            offspring[[pair, j]] = first[j];
            offspring[[pair + 1, j]] = second[j];
        }
    }
    offspring
}

fn one_point<T: Copy>(members: &Array2<T>, rng: &mut dyn RngCore) -> Array2<T> {
    pairwise(members, rng, |rng, dim, first, second| {
        if dim < 2 {
            return;
        }
        let point = rng.gen_range(1..dim);
        first[point..].swap_with_slice(&mut second[point..]);
    })
}

fn uniform<T: Copy>(members: &Array2<T>, rng: &mut dyn RngCore, swap_probability: f64) -> Array2<T> {
    pairwise(members, rng, |rng, dim, first, second| {
        for j in 0..dim {
            if rng.gen_bool(swap_probability) {
                std::mem::swap(&mut first[j], &mut second[j]);
            }
        }
    })
}

/// Splice each pair at one random point, exchanging the tails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnePointCrossover;

impl GeneticOperator for OnePointCrossover {
    fn apply(&self, population: &Population, _fitness: ArrayView1<f64>, ctx: &mut OperatorContext<'_>) -> Result<Population> {
        Ok(match population {
            Population::Integer(members) => Population::Integer(one_point(members, &mut *ctx.rng)),
            Population::Real(members) => Population::Real(one_point(members, &mut *ctx.rng)),
        })
    }
}

/// Exchange each gene of a pair independently.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformCrossover {
    pub swap_probability: f64,
}

impl Default for UniformCrossover {
    fn default() -> Self {
        UniformCrossover { swap_probability: 0.5 }
    }
}

impl GeneticOperator for UniformCrossover {
    fn apply(&self, population: &Population, _fitness: ArrayView1<f64>, ctx: &mut OperatorContext<'_>) -> Result<Population> {
        let p = self.swap_probability.clamp(0.0, 1.0);
        Ok(match population {
            Population::Integer(members) => Population::Integer(uniform(members, &mut *ctx.rng, p)),
            Population::Real(members) => Population::Real(uniform(members, &mut *ctx.rng, p)),
        })
    }
}
