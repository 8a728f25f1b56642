use ndarray::ArrayView1;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{AnvilError, Result};
use crate::types::{Gene, Population};
use super::{GeneticOperator, OperatorContext};

fn check_rate(rate: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(AnvilError::invalid_parameter(
            "rate".to_string(),
            format!("must lie in [0, 1], got {}", rate),
        ));
    }
    Ok(())
}

/// Reset each gene, with probability `rate`, to a uniform draw from its bounds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniformMutation {
    pub rate: f64,
}

impl Default for UniformMutation {
    fn default() -> Self {
        UniformMutation { rate: 0.1 }
    }
}

impl GeneticOperator for UniformMutation {
    fn apply(&self, population: &Population, _fitness: ArrayView1<f64>, ctx: &mut OperatorContext<'_>) -> Result<Population> {
        check_rate(self.rate)?;
        let mut mutated = population.clone();
        match &mut mutated {
            Population::Integer(members) => {
                for ((_, j), v) in members.indexed_iter_mut() {
                    if ctx.rng.gen_bool(self.rate) {
                        if let Gene::Integer(fresh) = ctx.space.sample_gene(j, &mut *ctx.rng) {
                            *v = fresh;
                        }
                    }
                }
            }
            Population::Real(members) => {
                for ((_, j), v) in members.indexed_iter_mut() {
                    if ctx.rng.gen_bool(self.rate) {
                        if let Gene::Real(fresh) = ctx.space.sample_gene(j, &mut *ctx.rng) {
                            *v = fresh;
                        }
                    }
                }
            }
        }
        Ok(mutated)
    }
}

/// Add normal noise to each gene with probability `rate`, then clip to the
/// bounds. Integer genes are rounded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianMutation {
    pub rate: f64,
    pub std: f64,
}

impl Default for GaussianMutation {
    fn default() -> Self {
        GaussianMutation { rate: 0.1, std: 1.0 }
    }
}

impl GeneticOperator for GaussianMutation {
    fn apply(&self, population: &Population, _fitness: ArrayView1<f64>, ctx: &mut OperatorContext<'_>) -> Result<Population> {
        check_rate(self.rate)?;
        let noise = Normal::new(0.0, self.std)?;
        let (low, high) = ctx.space.bounds();
        let mut mutated = population.clone();
        match &mut mutated {
            Population::Integer(members) => {
                for ((_, j), v) in members.indexed_iter_mut() {
                    if ctx.rng.gen_bool(self.rate) {
                        let shifted = (*v as f64 + noise.sample(&mut *ctx.rng)).round();
                        *v = shifted.clamp(low[j], high[j]) as i64;
                    }
                }
            }
            Population::Real(members) => {
                for ((_, j), v) in members.indexed_iter_mut() {
                    if ctx.rng.gen_bool(self.rate) {
                        *v = (*v + noise.sample(&mut *ctx.rng)).clamp(low[j], high[j]);
                    }
                }
            }
        }
        Ok(mutated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionSpace;
    use ndarray::{array, Array1, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_full_rate_resamples_within_bounds() {
        let space = ActionSpace::discrete(3).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let mut ctx = OperatorContext::new(&space, &mut rng);
        let population = Population::Integer(Array2::zeros((100, 1)));
        let mutated = UniformMutation { rate: 1.0 }.apply(&population, Array1::zeros(100).view(), &mut ctx).unwrap();
        let members = mutated.as_integer().unwrap();
        assert!(members.iter().all(|&v| (0..3).contains(&v)));
        assert!(members.iter().any(|&v| v != 0));
    }

    #[test]
    fn test_zero_rate_is_identity() {
        let space = ActionSpace::uniform_box(2, -5.0, 5.0).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let mut ctx = OperatorContext::new(&space, &mut rng);
        let population = Population::Real(array![[1.0, 2.0], [3.0, 4.0]]);
        let mutated = GaussianMutation { rate: 0.0, std: 1.0 }
            .apply(&population, Array1::zeros(2).view(), &mut ctx)
            .unwrap();
        assert_eq!(mutated, population);
    }

    #[test]
    fn test_gaussian_mutation_clips() {
        let space = ActionSpace::uniform_box(1, 0.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let mut ctx = OperatorContext::new(&space, &mut rng);
        let population = Population::Real(Array2::from_elem((50, 1), 0.5));
        let mutated = GaussianMutation { rate: 1.0, std: 10.0 }
            .apply(&population, Array1::zeros(50).view(), &mut ctx)
            .unwrap();
        assert!(mutated.as_real().unwrap().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_rate_validated() {
        let space = ActionSpace::discrete(3).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = OperatorContext::new(&space, &mut rng);
        let population = Population::Integer(Array2::zeros((2, 1)));
        assert!(UniformMutation { rate: 1.5 }.apply(&population, Array1::zeros(2).view(), &mut ctx).is_err());
    }
}
