use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::error::{AnvilError, Result};

/// Element type of a candidate population, fixed by the action space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulationDtype {
    Integer,
    Real,
}

impl fmt::Display for PopulationDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopulationDtype::Integer => write!(f, "integer"),
            PopulationDtype::Real => write!(f, "real"),
        }
    }
}

/// How a genetic population is seeded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulationInitStrategy {
    /// Normal samples around a starting point.
    #[default]
    Normal,
    /// Uniform samples across the action-space bounds.
    Uniform,
}

/// Space candidate solutions are drawn from.
///
/// Only built through [`ActionSpace::continuous`], [`ActionSpace::uniform_box`]
/// and [`ActionSpace::discrete`], or deserialized through the same checks, so
/// every space has at least one valid value per dimension.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ActionSpace {
    kind: SpaceKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum SpaceKind {
    /// Real vectors bounded per dimension.
    Box { low: Array1<f64>, high: Array1<f64> },
    /// A single integer in `0..n`.
    Discrete(usize),
}

impl<'de> Deserialize<'de> for ActionSpace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match SpaceKind::deserialize(deserializer)? {
            SpaceKind::Box { low, high } => ActionSpace::continuous(low, high),
            SpaceKind::Discrete(n) => ActionSpace::discrete(n),
        }
        .map_err(de::Error::custom)
    }
}

impl ActionSpace {
    pub fn continuous(low: Array1<f64>, high: Array1<f64>) -> Result<Self> {
        if low.len() != high.len() || low.is_empty() {
            return Err(AnvilError::dimension_mismatch(
                format!("non-empty bounds of equal length, low has {}", low.len()),
                format!("high with {}", high.len()),
            ));
        }
        if low.iter().zip(high.iter()).any(|(l, h)| !(l <= h)) {
            return Err(AnvilError::invalid_parameter("high", "every upper bound must be >= its lower bound"));
        }
        Ok(ActionSpace { kind: SpaceKind::Box { low, high } })
    }

    /// A box with the same bounds on each of `dim` dimensions.
    pub fn uniform_box(dim: usize, low: f64, high: f64) -> Result<Self> {
        Self::continuous(Array1::from_elem(dim, low), Array1::from_elem(dim, high))
    }

    pub fn discrete(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(AnvilError::invalid_parameter("n", "a discrete space needs at least one action"));
        }
        Ok(ActionSpace { kind: SpaceKind::Discrete(n) })
    }

    /// Number of actions of a discrete space.
    pub fn num_actions(&self) -> Option<usize> {
        match self.kind {
            SpaceKind::Discrete(n) => Some(n),
            SpaceKind::Box { .. } => None,
        }
    }

    pub fn dim(&self) -> usize {
        match &self.kind {
            SpaceKind::Box { low, .. } => low.len(),
            SpaceKind::Discrete(_) => 1,
        }
    }

    pub fn dtype(&self) -> PopulationDtype {
        match &self.kind {
            SpaceKind::Box { .. } => PopulationDtype::Real,
            SpaceKind::Discrete(_) => PopulationDtype::Integer,
        }
    }

    /// Inclusive per-dimension bounds.
    pub fn bounds(&self) -> (Array1<f64>, Array1<f64>) {
        match &self.kind {
            SpaceKind::Box { low, high } => (low.clone(), high.clone()),
            SpaceKind::Discrete(n) => (Array1::zeros(1), Array1::from_elem(1, (*n - 1) as f64)),
        }
    }

    /// Cast real-valued candidates into this space. Integer spaces round and
    /// clip to their bounds; box spaces keep the values as drawn.
    pub fn population_from_real(&self, values: Array2<f64>) -> Population {
        match &self.kind {
            SpaceKind::Box { .. } => Population::Real(values),
            SpaceKind::Discrete(n) => {
                let high = (*n - 1) as i64;
                Population::Integer(values.mapv(|v| (v.round() as i64).clamp(0, high)))
            }
        }
    }

    /// Draw one value uniformly from dimension `j`.
    pub fn sample_gene<R: Rng + ?Sized>(&self, j: usize, rng: &mut R) -> Gene {
        match &self.kind {
            SpaceKind::Box { low, high } => {
                if low[j] < high[j] {
                    Gene::Real(rng.gen_range(low[j]..high[j]))
                } else {
                    Gene::Real(low[j])
                }
            }
            SpaceKind::Discrete(n) => Gene::Integer(rng.gen_range(0..*n as i64)),
        }
    }

    /// `size` candidates drawn uniformly across the bounds.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, size: usize, rng: &mut R) -> Population {
        let dim = self.dim();
        match self.dtype() {
            PopulationDtype::Real => Population::Real(Array2::from_shape_fn((size, dim), |(_, j)| {
                match self.sample_gene(j, rng) {
                    Gene::Real(v) => v,
                    Gene::Integer(v) => v as f64,
                }
            })),
            PopulationDtype::Integer => Population::Integer(Array2::from_shape_fn((size, dim), |(_, j)| {
                match self.sample_gene(j, rng) {
                    Gene::Integer(v) => v,
                    Gene::Real(v) => v.round() as i64,
                }
            })),
        }
    }
}

/// A single population entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gene {
    Integer(i64),
    Real(f64),
}

/// Candidate solutions, one per row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Population {
    Integer(Array2<i64>),
    Real(Array2<f64>),
}

impl Population {
    pub fn dtype(&self) -> PopulationDtype {
        match self {
            Population::Integer(_) => PopulationDtype::Integer,
            Population::Real(_) => PopulationDtype::Real,
        }
    }

    /// `(members, dimensions)`
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Population::Integer(members) => members.dim(),
            Population::Real(members) => members.dim(),
        }
    }

    pub fn len(&self) -> usize {
        self.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_real(&self) -> Option<&Array2<f64>> {
        match self {
            Population::Real(members) => Some(members),
            Population::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<&Array2<i64>> {
        match self {
            Population::Integer(members) => Some(members),
            Population::Real(_) => None,
        }
    }

    /// Members as reals, converting integers.
    pub fn to_real(&self) -> Array2<f64> {
        match self {
            Population::Integer(members) => members.mapv(|v| v as f64),
            Population::Real(members) => members.clone(),
        }
    }

    pub fn mean(&self) -> Array1<f64> {
        self.to_real().mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(self.dim().1))
    }

    pub fn std(&self) -> Array1<f64> {
        self.to_real().std_axis(Axis(0), 0.0)
    }

    pub fn min(&self) -> Array1<f64> {
        self.to_real().fold_axis(Axis(0), f64::INFINITY, |&a, &b| a.min(b))
    }

    /// Members at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Population {
        match self {
            Population::Integer(members) => Population::Integer(members.select(Axis(0), indices)),
            Population::Real(members) => Population::Real(members.select(Axis(0), indices)),
        }
    }

    pub fn row(&self, i: usize) -> Vec<Gene> {
        match self {
            Population::Integer(members) => members.row(i).iter().map(|&v| Gene::Integer(v)).collect(),
            Population::Real(members) => members.row(i).iter().map(|&v| Gene::Real(v)).collect(),
        }
    }
}

/// Check that per-member values line up with a population of `size`.
pub(crate) fn check_fitness(fitness: ArrayView1<f64>, size: usize) -> Result<()> {
    if fitness.len() != size {
        return Err(AnvilError::dimension_mismatch(
            format!("{} rewards", size),
            format!("{}", fitness.len()),
        ));
    }
    if fitness.iter().any(|r| !r.is_finite()) {
        return Err(AnvilError::NumericalError("rewards must be finite".to_string()));
    }
    Ok(())
}
