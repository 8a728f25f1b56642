use ndarray::{array, Array1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AnvilError;
use crate::operators::{
    self, GaussianMutation, Identity, OnePointCrossover, OperatorContext, RouletteSelection, TournamentSelection,
    UniformCrossover, UniformMutation,
};
use crate::types::{ActionSpace, Population, PopulationDtype, PopulationInitStrategy};
use crate::updaters::{EvolutionaryUpdater, GeneticUpdater};

fn sphere(population: &Population) -> Array1<f64> {
    population.to_real().map_axis(Axis(1), |row| -row.dot(&row))
}

fn assert_close(actual: f64, expected: f64, rtol: f64) {
    assert!(
        (actual - expected).abs() <= rtol * expected.abs(),
        "{} not within {} of {}",
        actual,
        rtol,
        expected
    );
}

#[test]
fn test_evolution_strategy_continuous() {
    let space = ActionSpace::uniform_box(2, -100.0, 100.0).unwrap();
    let mut updater = EvolutionaryUpdater::new(space, 10_000).unwrap();
    let mut rng = StdRng::seed_from_u64(42);

    let population = updater
        .initialize_population(array![10.0, 10.0].view(), 1.0, &mut rng)
        .unwrap();
    assert_eq!(population.dtype(), PopulationDtype::Real);
    assert_eq!(population.dim(), (10_000, 2));
    for j in 0..2 {
        assert_close(population.mean()[j], 10.0, 0.1);
        assert_close(population.std()[j], 1.0, 0.1);
    }

    let rewards = sphere(updater.population().unwrap());
    let normalized = EvolutionaryUpdater::normalized_rewards(rewards.view()).unwrap();
    let direction = updater.estimate_direction(normalized.view()).unwrap();
    assert!(direction.iter().all(|&d| d < 0.0));

    let population = updater.update(0.01, direction.view(), &mut rng).unwrap();
    assert_eq!(population.dtype(), PopulationDtype::Real);
    let mean = updater.mean().unwrap();
    assert!(mean.iter().all(|&m| m < 10.0), "mean {:?}", mean);
    assert_eq!(updater.std().unwrap(), 1.0);
}

#[test]
fn test_evolution_strategy_discrete() {
    let space = ActionSpace::discrete(10).unwrap();
    let mut updater = EvolutionaryUpdater::new(space, 1_000).unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    let population = updater.initialize_population(array![5.0].view(), 1.0, &mut rng).unwrap();
    assert_eq!(population.dtype(), PopulationDtype::Integer);
    let members = population.as_integer().unwrap();
    assert!(members.iter().all(|&v| (0..10).contains(&v)));

    let rewards = sphere(updater.population().unwrap());
    let normalized = EvolutionaryUpdater::normalized_rewards(rewards.view()).unwrap();
    let direction = updater.estimate_direction(normalized.view()).unwrap();
    let population = updater.update(0.5, direction.view(), &mut rng).unwrap();

    assert_eq!(population.dtype(), PopulationDtype::Integer);
    assert!(updater.mean().unwrap()[0] < 5.0);
}

#[test]
fn test_normalized_rewards() {
    let normalized = EvolutionaryUpdater::normalized_rewards(array![1.0, 2.0, 3.0].view()).unwrap();
    assert!(normalized.sum().abs() < 1e-12);
    assert!((normalized.std(0.0) - 1.0).abs() < 1e-12);

    let flat = EvolutionaryUpdater::normalized_rewards(array![4.0, 4.0].view()).unwrap();
    assert_eq!(flat, array![0.0, 0.0]);

    assert!(EvolutionaryUpdater::normalized_rewards(array![1.0, f64::NAN].view()).is_err());
}

#[test]
fn test_estimate_direction_checks_length() {
    let mut updater = EvolutionaryUpdater::new(ActionSpace::uniform_box(3, -1.0, 1.0).unwrap(), 5).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    assert!(matches!(
        updater.estimate_direction(Array1::zeros(5).view()),
        Err(AnvilError::UninitializedPopulation)
    ));
    updater
        .initialize_population(Array1::zeros(3).view(), 0.5, &mut rng)
        .unwrap();
    assert!(matches!(
        updater.estimate_direction(Array1::zeros(4).view()),
        Err(AnvilError::DimensionMismatch { .. })
    ));
    assert!(updater.update(0.1, Array1::zeros(2).view(), &mut rng).is_err());
}

#[test]
fn test_genetic_continuous() {
    let space = ActionSpace::uniform_box(2, -100.0, 100.0).unwrap();
    let mut updater = GeneticUpdater::new(space, 200).unwrap();
    let mut rng = StdRng::seed_from_u64(11);

    let population = updater
        .initialize_population(Some(array![10.0, 10.0].view()), PopulationInitStrategy::Normal, &mut rng)
        .unwrap();
    assert_eq!(population.dtype(), PopulationDtype::Real);
    for j in 0..2 {
        assert_close(population.mean()[j], 10.0, 0.1);
    }

    let rewards = sphere(updater.population().unwrap());
    let population = updater
        .update(
            rewards.view(),
            &RouletteSelection::default(),
            &OnePointCrossover,
            &UniformMutation::default(),
            &mut rng,
        )
        .unwrap();
    assert_eq!(population.dtype(), PopulationDtype::Real);
    assert_eq!(population.dim(), (200, 2));
    assert!(population.min().iter().all(|&m| m < 10.0));
    assert_eq!(updater.generation(), 1);
}

#[test]
fn test_genetic_discrete() {
    let space = ActionSpace::discrete(10).unwrap();
    let mut updater = GeneticUpdater::new(space, 2_000).unwrap();
    let mut rng = StdRng::seed_from_u64(5);

    let population = updater
        .initialize_population(None, PopulationInitStrategy::Uniform, &mut rng)
        .unwrap();
    assert_eq!(population.dtype(), PopulationDtype::Integer);
    // Uniform over 0..=9.
    assert_close(population.mean()[0], 4.5, 0.1);

    for _ in 0..3 {
        let rewards = sphere(updater.population().unwrap());
        let population = updater
            .update(
                rewards.view(),
                &TournamentSelection::default(),
                &UniformCrossover::default(),
                &GaussianMutation::default(),
                &mut rng,
            )
            .unwrap();
        assert_eq!(population.dtype(), PopulationDtype::Integer);
        assert_eq!(population.len(), 2_000);
        let members = population.as_integer().unwrap();
        assert!(members.iter().all(|&v| (0..10).contains(&v)));
    }
    assert_eq!(updater.generation(), 3);
}

#[test]
fn test_genetic_with_closure_operator() {
    let space = ActionSpace::uniform_box(3, -5.0, 5.0).unwrap();
    let mut updater = GeneticUpdater::new(space, 16).unwrap().init_std(0.5);
    let mut rng = StdRng::seed_from_u64(9);
    updater
        .initialize_population(Some(Array1::zeros(3).view()), PopulationInitStrategy::Normal, &mut rng)
        .unwrap();

    // Replace every member with the best one, jittered inside the bounds.
    let elitist = operators::from_fn(|population, fitness, ctx| {
        let best = fitness
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, &f)| if f > acc.1 { (i, f) } else { acc })
            .0;
        let mut members = population.select(&vec![best; population.len()]).to_real();
        let (low, high) = ctx.space.bounds();
        for ((_, j), v) in members.indexed_iter_mut() {
            *v = (*v + ctx.rng.gen_range(-0.01..0.01)).clamp(low[j], high[j]);
        }
        Ok(Population::Real(members))
    });

    let rewards = sphere(updater.population().unwrap());
    let best = rewards.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let population = updater
        .update(rewards.view(), &elitist, &Identity, &Identity, &mut rng)
        .unwrap();

    let next = sphere(population);
    assert!(next.iter().all(|&r| (r - best).abs() < 0.1));
}

#[test]
fn test_operator_context_is_reusable() {
    let space = ActionSpace::discrete(4).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let population = space.sample_uniform(8, &mut rng);
    let fitness = Array1::from_iter((0..8).map(|i| i as f64));

    let mut ctx = OperatorContext::new(&space, &mut rng);
    let selected = operators::GeneticOperator::apply(&RouletteSelection::default(), &population, fitness.view(), &mut ctx)
        .unwrap();
    let crossed = operators::GeneticOperator::apply(&OnePointCrossover, &selected, fitness.view(), &mut ctx).unwrap();
    assert_eq!(crossed.dtype(), PopulationDtype::Integer);
    assert_eq!(crossed.dim(), (8, 1));
}
