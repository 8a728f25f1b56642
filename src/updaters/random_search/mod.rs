//! Population-based search over candidate action (or parameter) vectors.
//!
//! A generation runs outside the updater: the caller evaluates every member
//! of `population()` in one batch, then hands the rewards (or a direction
//! derived from them) back to `update`.

pub mod evolutionary;
pub mod genetic;

pub use evolutionary::EvolutionaryUpdater;
pub use genetic::GeneticUpdater;

use crate::error::{AnvilError, Result};

fn check_population_size(population_size: usize) -> Result<()> {
    if population_size == 0 {
        return Err(AnvilError::invalid_parameter(
            "population_size",
            "population must have at least one member",
        ));
    }
    Ok(())
}
