use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::error::{AnvilError, Result};
use crate::types::{check_fitness, ActionSpace, Population, PopulationDtype};
use super::check_population_size;

#[derive(Clone, Debug)]
struct SearchState {
    mean: Array1<f64>,
    std: f64,
    noise: Array2<f64>,
    population: Population,
}

/// Evolution strategy: a normal search distribution whose mean follows an
/// externally estimated ascent direction.
///
/// The updater never looks at rewards. Callers typically compose
/// [`normalized_rewards`](Self::normalized_rewards) and
/// [`estimate_direction`](Self::estimate_direction) between generations.
#[derive(Clone, Debug)]
pub struct EvolutionaryUpdater {
    population_size: usize,
    space: ActionSpace,
    state: Option<SearchState>,
}

impl EvolutionaryUpdater {
    pub fn new(space: ActionSpace, population_size: usize) -> Result<Self> {
        check_population_size(population_size)?;
        Ok(EvolutionaryUpdater { population_size, space, state: None })
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

    fn state(&self) -> Result<&SearchState> {
        self.state.as_ref().ok_or(AnvilError::UninitializedPopulation)
    }

    pub fn population(&self) -> Result<&Population> {
        Ok(&self.state()?.population)
    }

    pub fn mean(&self) -> Result<&Array1<f64>> {
        Ok(&self.state()?.mean)
    }

    pub fn std(&self) -> Result<f64> {
        Ok(self.state()?.std)
    }

    /// Standard-normal draws behind the current population, one row per member.
    pub fn noise(&self) -> Result<&Array2<f64>> {
        Ok(&self.state()?.noise)
    }

    fn sample<R: Rng>(&self, mean: &Array1<f64>, std: f64, rng: &mut R) -> (Array2<f64>, Population) {
        let noise: Array2<f64> = Array2::random_using((self.population_size, self.space.dim()), StandardNormal, rng);
        let values = &noise * std + &mean.view().insert_axis(Axis(0));
        (noise, self.space.population_from_real(values))
    }

    /// Draw the first generation around `starting_point`.
    pub fn initialize_population<R: Rng>(
        &mut self,
        starting_point: ArrayView1<f64>,
        std: f64,
        rng: &mut R,
    ) -> Result<&Population> {
        if starting_point.len() != self.space.dim() {
            return Err(AnvilError::dimension_mismatch(
                format!("starting point of length {}", self.space.dim()),
                format!("{}", starting_point.len()),
            ));
        }
        if !(std > 0.0 && std.is_finite()) {
            return Err(AnvilError::invalid_parameter(
                "std".to_string(),
                format!("must be positive, got {}", std),
            ));
        }

        let mean = starting_point.to_owned();
        let (noise, population) = self.sample(&mean, std, rng);
        info!(
            "initialized {} population of {} around {:?}",
            population.dtype(),
            self.population_size,
            mean
        );
        self.state = Some(SearchState { mean, std, noise, population });
        self.population()
    }

    /// `mean += learning_rate * direction`, then resample around the new mean.
    pub fn update<R: Rng>(
        &mut self,
        learning_rate: f64,
        direction: ArrayView1<f64>,
        rng: &mut R,
    ) -> Result<&Population> {
        let state = self.state()?;
        if direction.len() != state.mean.len() {
            return Err(AnvilError::dimension_mismatch(
                format!("direction of length {}", state.mean.len()),
                format!("{}", direction.len()),
            ));
        }

        let mean = &state.mean + &(&direction * learning_rate);
        let std = state.std;
        let (noise, population) = self.sample(&mean, std, rng);
        if population.dtype() != self.dtype() {
            return Err(AnvilError::PopulationDtype {
                expected: self.dtype().to_string(),
                actual: population.dtype().to_string(),
            });
        }
        info!("evolution step: mean moved to {:?}", mean);
        self.state = Some(SearchState { mean, std, noise, population });
        self.population()
    }

    /// Rewards shifted to zero mean and scaled to unit standard deviation.
    /// Constant rewards carry no signal and normalize to zeros.
    pub fn normalized_rewards(rewards: ArrayView1<f64>) -> Result<Array1<f64>> {
        check_fitness(rewards, rewards.len())?;
        let mean = rewards.mean().ok_or_else(|| AnvilError::invalid_parameter("rewards", "no rewards given"))?;
        let std = rewards.std(0.0);
        if std == 0.0 {
            warn!("all rewards equal, normalized rewards are zero");
            return Ok(Array1::zeros(rewards.len()));
        }
        Ok(rewards.mapv(|r| (r - mean) / std))
    }

    /// `noise^T . rewards / N` for the current generation.
    pub fn estimate_direction(&self, normalized_rewards: ArrayView1<f64>) -> Result<Array1<f64>> {
        let state = self.state()?;
        check_fitness(normalized_rewards, self.population_size)?;
        Ok(state.noise.t().dot(&normalized_rewards) / self.population_size as f64)
    }
}
