use ndarray::ArrayView1;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AnvilError, Result};
use crate::types::{check_fitness, Population};
use super::{GeneticOperator, OperatorContext};

/// Fitness-proportionate sampling with replacement.
///
/// Fitness is shifted so the worst member keeps a small positive weight,
/// which lets negative rewards drive selection too.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouletteSelection {
    pub epsilon: f64,
}

impl Default for RouletteSelection {
    fn default() -> Self {
        RouletteSelection { epsilon: 1e-8 }
    }
}

impl GeneticOperator for RouletteSelection {
    fn apply(&self, population: &Population, fitness: ArrayView1<f64>, ctx: &mut OperatorContext<'_>) -> Result<Population> {
        check_fitness(fitness, population.len())?;
        let min = fitness.iter().cloned().fold(f64::INFINITY, f64::min);
        let weights = fitness.iter().map(|&f| f - min + self.epsilon);
        let wheel = WeightedIndex::new(weights)?;
        let indices: Vec<usize> = (0..population.len()).map(|_| wheel.sample(&mut *ctx.rng)).collect();
        Ok(population.select(&indices))
    }
}

/// Repeatedly keeps the fittest of `size` uniformly drawn members.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentSelection {
    pub size: usize,
}

impl Default for TournamentSelection {
    fn default() -> Self {
        TournamentSelection { size: 3 }
    }
}

impl GeneticOperator for TournamentSelection {
    fn apply(&self, population: &Population, fitness: ArrayView1<f64>, ctx: &mut OperatorContext<'_>) -> Result<Population> {
        check_fitness(fitness, population.len())?;
        if self.size == 0 {
            return Err(AnvilError::invalid_parameter("size", "tournament needs at least one entrant"));
        }
        let n = population.len();
        let indices: Vec<usize> = (0..n)
            .map(|_| {
                let mut best = ctx.rng.gen_range(0..n);
                for _ in 1..self.size {
                    let challenger = ctx.rng.gen_range(0..n);
                    if fitness[challenger] > fitness[best] {
                        best = challenger;
                    }
                }
                best
            })
            .collect();
        Ok(population.select(&indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionSpace;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_roulette_favours_fitter_members() {
        let space = ActionSpace::discrete(10).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let mut ctx = OperatorContext::new(&space, &mut rng);
        let population = Population::Integer(array![[0], [9]]);
        let fitness = array![-81.0, 0.0];

        let mut zeros = 0;
        for _ in 0..200 {
            let selected = RouletteSelection::default().apply(&population, fitness.view(), &mut ctx).unwrap();
            zeros += selected.as_integer().unwrap().iter().filter(|&&v| v == 0).count();
        }
        assert!(zeros < 40);
    }

    #[test]
    fn test_tournament_keeps_size() {
        let space = ActionSpace::uniform_box(1, -1.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = OperatorContext::new(&space, &mut rng);
        let population = Population::Real(array![[0.1], [0.2], [0.3], [0.4]]);
        let selected = TournamentSelection { size: 4 }
            .apply(&population, array![1.0, 2.0, 3.0, 4.0].view(), &mut ctx)
            .unwrap();
        assert_eq!(selected.dim(), (4, 1));
    }

    #[test]
    fn test_fitness_length_checked() {
        let space = ActionSpace::discrete(2).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut ctx = OperatorContext::new(&space, &mut rng);
        let population = Population::Integer(array![[0], [1]]);
        assert!(RouletteSelection::default().apply(&population, array![1.0].view(), &mut ctx).is_err());
    }
}
