use log::info;
use ndarray::{Array2, ArrayView1};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::error::{AnvilError, Result};
use crate::operators::{GeneticOperator, OperatorContext};
use crate::types::{check_fitness, ActionSpace, Population, PopulationDtype, PopulationInitStrategy};
use super::check_population_size;

/// Genetic algorithm: owns the population and sequences selection,
/// crossover and mutation. Operator logic lives in [`crate::operators`].
#[derive(Clone, Debug)]
pub struct GeneticUpdater {
    population_size: usize,
    space: ActionSpace,
    init_std: f64,
    population: Option<Population>,
    generation: usize,
}

impl GeneticUpdater {
    pub fn new(space: ActionSpace, population_size: usize) -> Result<Self> {
        check_population_size(population_size)?;
        Ok(GeneticUpdater {
            population_size,
            space,
            init_std: 1.0,
            population: None,
            generation: 0,
        })
    }

    /// Spread of the normal initialization.
    pub fn init_std(mut self, v: f64) -> Self {
        self.init_std = v;
        self
    }

    pub fn population_size(&self) -> usize {
        self.population_size
    }

    pub fn space(&self) -> &ActionSpace {
        &self.space
    }

    pub fn dtype(&self) -> PopulationDtype {
        self.space.dtype()
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn population(&self) -> Result<&Population> {
        self.population.as_ref().ok_or(AnvilError::UninitializedPopulation)
    }

    /// Seed the first generation. [`PopulationInitStrategy::Normal`] needs a
    /// starting point; [`PopulationInitStrategy::Uniform`] ignores it.
    pub fn initialize_population<R: Rng>(
        &mut self,
        starting_point: Option<ArrayView1<f64>>,
        strategy: PopulationInitStrategy,
        rng: &mut R,
    ) -> Result<&Population> {
        let population = match strategy {
            PopulationInitStrategy::Normal => {
                let start = starting_point.ok_or_else(|| {
                    AnvilError::invalid_parameter("starting_point", "normal initialization needs a starting point")
                })?;
                if start.len() != self.space.dim() {
                    return Err(AnvilError::dimension_mismatch(
                        format!("starting point of length {}", self.space.dim()),
                        format!("{}", start.len()),
                    ));
                }
                if !(self.init_std > 0.0 && self.init_std.is_finite()) {
                    return Err(AnvilError::invalid_parameter(
                        "init_std".to_string(),
                        format!("must be positive, got {}", self.init_std),
                    ));
                }
                let noise: Array2<f64> =
                    Array2::random_using((self.population_size, self.space.dim()), StandardNormal, rng);
                self.space.population_from_real(noise * self.init_std + &start)
            }
            PopulationInitStrategy::Uniform => self.space.sample_uniform(self.population_size, rng),
        };

        info!(
            "initialized {} population of {} with {:?} strategy",
            population.dtype(),
            self.population_size,
            strategy
        );
        self.population = Some(population);
        self.generation = 0;
        self.population()
    }

    fn check_offspring(&self, stage: &str, offspring: &Population) -> Result<()> {
        if offspring.dtype() != self.dtype() {
            return Err(AnvilError::PopulationDtype {
                expected: self.dtype().to_string(),
                actual: offspring.dtype().to_string(),
            });
        }
        let expected = (self.population_size, self.space.dim());
        if offspring.dim() != expected {
            return Err(AnvilError::dimension_mismatch(
                format!("{} output of shape {:?}", stage, expected),
                format!("{:?}", offspring.dim()),
            ));
        }
        Ok(())
    }

    /// Advance one generation: selection, then crossover, then mutation.
    /// The population is only replaced when every stage succeeds.
    pub fn update<R: Rng>(
        &mut self,
        rewards: ArrayView1<f64>,
        selection: &dyn GeneticOperator,
        crossover: &dyn GeneticOperator,
        mutation: &dyn GeneticOperator,
        rng: &mut R,
    ) -> Result<&Population> {
        let current = self.population()?;
        check_fitness(rewards, self.population_size)?;

        let mut ctx = OperatorContext::new(&self.space, rng);
        let mating_pool = selection.apply(current, rewards, &mut ctx)?;
        self.check_offspring("selection", &mating_pool)?;
        let offspring = crossover.apply(&mating_pool, rewards, &mut ctx)?;
        self.check_offspring("crossover", &offspring)?;
        let next = mutation.apply(&offspring, rewards, &mut ctx)?;
        self.check_offspring("mutation", &next)?;

        let best = rewards.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        self.generation += 1;
        info!("generation {}: best reward {:.4}", self.generation, best);
        self.population = Some(next);
        self.population()
    }
}
