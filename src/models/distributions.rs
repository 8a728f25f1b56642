//! Action distributions produced by stochastic policy heads.
//!
//! Besides sampling and density evaluation, each distribution knows how to
//! turn an upstream gradient on `log_prob(actions)` into gradients on the
//! head outputs that parameterize it.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f32::consts::PI;

use crate::error::{AnvilError, Result};
use super::heads::HeadGradients;

/// Diagonal Gaussian over continuous actions, one row per observation.
#[derive(Clone, Debug, PartialEq)]
pub struct DiagGaussian {
    pub loc: Array2<f32>,
    pub scale: Array2<f32>,
}

impl DiagGaussian {
    /// Build from per-row means and a state-independent log standard deviation.
    pub fn new(loc: Array2<f32>, log_std: ArrayView1<f32>) -> Self {
        let scale = Array2::from_shape_fn(loc.dim(), |(_, j)| log_std[j].exp());
        DiagGaussian { loc, scale }
    }

    fn check_actions(&self, actions: ArrayView2<f32>) -> Result<()> {
        if actions.dim() != self.loc.dim() {
            return Err(AnvilError::dimension_mismatch(
                format!("actions of shape {:?}", self.loc.dim()),
                format!("{:?}", actions.dim()),
            ));
        }
        Ok(())
    }

    /// Log density of each action row, summed over action dimensions.
    pub fn log_prob(&self, actions: ArrayView2<f32>) -> Result<Array1<f32>> {
        self.check_actions(actions)?;
        let half_log_2pi = 0.5 * (2.0 * PI).ln();
        let mut log_probs = Array1::zeros(self.loc.nrows());
        for (i, lp) in log_probs.iter_mut().enumerate() {
            for j in 0..self.loc.ncols() {
                let z = (actions[[i, j]] - self.loc[[i, j]]) / self.scale[[i, j]];
                *lp += -0.5 * z * z - self.scale[[i, j]].ln() - half_log_2pi;
            }
        }
        Ok(log_probs)
    }

    pub fn entropy(&self) -> Array1<f32> {
        let per_dim = 0.5 * (1.0 + (2.0 * PI).ln());
        self.scale.mapv(|s| s.ln() + per_dim).sum_axis(Axis(1))
    }

    pub fn mode(&self) -> Array2<f32> {
        self.loc.clone()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array2<f32> {
        let mut actions = self.loc.clone();
        actions.zip_mut_with(&self.scale, |a, &s| {
            let eps: f32 = rng.sample(StandardNormal);
            *a += s * eps;
        });
        actions
    }

    /// Gradients of `sum_i upstream[i] * log_prob(actions)[i]` with respect to
    /// the means (per row) and the log standard deviation (summed over rows).
    pub fn log_prob_gradients(&self, actions: ArrayView2<f32>, upstream: ArrayView1<f32>) -> Result<HeadGradients> {
        self.check_actions(actions)?;
        let mut d_loc = Array2::zeros(self.loc.dim());
        let mut d_log_std = Array1::zeros(self.loc.ncols());
        for ((i, j), d) in d_loc.indexed_iter_mut() {
            let scale = self.scale[[i, j]];
            let z = (actions[[i, j]] - self.loc[[i, j]]) / scale;
            *d = upstream[i] * z / scale;
            d_log_std[j] += upstream[i] * (z * z - 1.0);
        }
        Ok(HeadGradients { output: d_loc, log_std: Some(d_log_std) })
    }
}

/// Categorical distribution over `n` discrete actions, parameterized by logits.
/// Actions are passed as a single column of action indices.
#[derive(Clone, Debug, PartialEq)]
pub struct Categorical {
    pub logits: Array2<f32>,
    pub probs: Array2<f32>,
}

impl Categorical {
    pub fn from_logits(logits: Array2<f32>) -> Self {
        let mut probs = logits.clone();
        for mut row in probs.rows_mut() {
            let max_logit = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            row.mapv_inplace(|x| (x - max_logit).exp());
            let sum_exp = row.sum();
            row.mapv_inplace(|x| x / sum_exp);
        }
        Categorical { logits, probs }
    }

    pub fn num_actions(&self) -> usize {
        self.probs.ncols()
    }

    fn action_indices(&self, actions: ArrayView2<f32>) -> Result<Vec<usize>> {
        if actions.ncols() != 1 || actions.nrows() != self.probs.nrows() {
            return Err(AnvilError::dimension_mismatch(
                format!("actions of shape ({}, 1)", self.probs.nrows()),
                format!("{:?}", actions.dim()),
            ));
        }
        actions
            .column(0)
            .iter()
            .map(|&a| {
                let index = a.round();
                if !index.is_finite() || index < 0.0 || index as usize >= self.num_actions() {
                    Err(AnvilError::invalid_parameter(
                        "actions".to_string(),
                        format!("action {} outside 0..{}", a, self.num_actions()),
                    ))
                } else {
                    Ok(index as usize)
                }
            })
            .collect()
    }

    pub fn log_prob(&self, actions: ArrayView2<f32>) -> Result<Array1<f32>> {
        let indices = self.action_indices(actions)?;
        Ok(Array1::from_shape_fn(indices.len(), |i| self.probs[[i, indices[i]]].max(f32::MIN_POSITIVE).ln()))
    }

    pub fn entropy(&self) -> Array1<f32> {
        self.probs.map_axis(Axis(1), |row| {
            row.iter().filter(|&&p| p > 1e-8).map(|&p| -p * p.ln()).sum()
        })
    }

    /// Most likely action per row, as a column of indices.
    pub fn mode(&self) -> Array2<f32> {
        let modes = self.probs.map_axis(Axis(1), |row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
                .0 as f32
        });
        modes.insert_axis(Axis(1))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array2<f32> {
        let samples = self.probs.map_axis(Axis(1), |row| {
            let rand_val: f32 = rng.gen();
            let mut cumsum = 0.0;
            for (i, &p) in row.iter().enumerate() {
                cumsum += p;
                if rand_val < cumsum {
                    return i as f32;
                }
            }
            (row.len() - 1) as f32
        });
        samples.insert_axis(Axis(1))
    }

    /// Gradients of `sum_i upstream[i] * log_prob(actions)[i]` with respect to the logits.
    pub fn log_prob_gradients(&self, actions: ArrayView2<f32>, upstream: ArrayView1<f32>) -> Result<HeadGradients> {
        let indices = self.action_indices(actions)?;
        let mut d_logits = -&self.probs;
        for (i, &a) in indices.iter().enumerate() {
            d_logits[[i, a]] += 1.0;
        }
        d_logits *= &upstream.insert_axis(Axis(1));
        Ok(HeadGradients { output: d_logits, log_std: None })
    }
}

/// Distribution returned by a stochastic actor.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionDistribution {
    DiagGaussian(DiagGaussian),
    Categorical(Categorical),
}

impl ActionDistribution {
    /// Mean of a Gaussian policy, `None` for categorical policies.
    pub fn location(&self) -> Option<&Array2<f32>> {
        match self {
            ActionDistribution::DiagGaussian(d) => Some(&d.loc),
            ActionDistribution::Categorical(_) => None,
        }
    }

    /// Standard deviation of a Gaussian policy, `None` for categorical policies.
    pub fn scale(&self) -> Option<&Array2<f32>> {
        match self {
            ActionDistribution::DiagGaussian(d) => Some(&d.scale),
            ActionDistribution::Categorical(_) => None,
        }
    }

    pub fn log_prob(&self, actions: ArrayView2<f32>) -> Result<Array1<f32>> {
        match self {
            ActionDistribution::DiagGaussian(d) => d.log_prob(actions),
            ActionDistribution::Categorical(d) => d.log_prob(actions),
        }
    }

    pub fn entropy(&self) -> Array1<f32> {
        match self {
            ActionDistribution::DiagGaussian(d) => d.entropy(),
            ActionDistribution::Categorical(d) => d.entropy(),
        }
    }

    pub fn mode(&self) -> Array2<f32> {
        match self {
            ActionDistribution::DiagGaussian(d) => d.mode(),
            ActionDistribution::Categorical(d) => d.mode(),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array2<f32> {
        match self {
            ActionDistribution::DiagGaussian(d) => d.sample(rng),
            ActionDistribution::Categorical(d) => d.sample(rng),
        }
    }

    pub fn log_prob_gradients(&self, actions: ArrayView2<f32>, upstream: ArrayView1<f32>) -> Result<HeadGradients> {
        match self {
            ActionDistribution::DiagGaussian(d) => d.log_prob_gradients(actions, upstream),
            ActionDistribution::Categorical(d) => d.log_prob_gradients(actions, upstream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_standard_normal_log_prob() {
        let dist = DiagGaussian::new(array![[0.0]], array![0.0].view());
        let lp = dist.log_prob(array![[0.0]].view()).unwrap();
        assert!((lp[0] + 0.5 * (2.0 * PI).ln()).abs() < 1e-6);
    }

    #[test]
    fn test_gaussian_gradients_match_finite_difference() {
        let log_std = array![0.3f32];
        let loc = array![[0.2f32]];
        let action = array![[1.0f32]];
        let dist = DiagGaussian::new(loc.clone(), log_std.view());
        let grads = dist.log_prob_gradients(action.view(), array![1.0].view()).unwrap();

        let h = 1e-3;
        let lp = |loc: &Array2<f32>, log_std: &Array1<f32>| {
            DiagGaussian::new(loc.clone(), log_std.view()).log_prob(action.view()).unwrap()[0]
        };
        let numeric_loc = (lp(&(&loc + h), &log_std) - lp(&(&loc - h), &log_std)) / (2.0 * h);
        let numeric_std = (lp(&loc, &(&log_std + h)) - lp(&loc, &(&log_std - h))) / (2.0 * h);
        assert!((grads.output[[0, 0]] - numeric_loc).abs() < 1e-2);
        assert!((grads.log_std.unwrap()[0] - numeric_std).abs() < 1e-2);
    }

    #[test]
    fn test_categorical_probs_sum_to_one() {
        let dist = Categorical::from_logits(array![[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]]);
        for row in dist.probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert_eq!(dist.mode(), array![[2.0], [0.0]]);
    }

    #[test]
    fn test_categorical_gradient_is_onehot_minus_probs() {
        let dist = Categorical::from_logits(array![[0.0, 0.0]]);
        let grads = dist.log_prob_gradients(array![[1.0]].view(), array![2.0].view()).unwrap();
        assert!((grads.output[[0, 0]] + 1.0).abs() < 1e-6);
        assert!((grads.output[[0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_categorical_rejects_out_of_range_action() {
        let dist = Categorical::from_logits(array![[0.0, 0.0]]);
        assert!(dist.log_prob(array![[2.0]].view()).is_err());
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(matches!(
                dist.log_prob(array![[bad]].view()),
                Err(AnvilError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_gaussian_sample_shape_and_location() {
        let dist = DiagGaussian::new(Array2::from_elem((2000, 1), 3.0), array![-2.0].view());
        let mut rng = StdRng::seed_from_u64(7);
        let samples = dist.sample(&mut rng);
        assert_eq!(samples.dim(), (2000, 1));
        let mean = samples.mean().unwrap();
        assert!((mean - 3.0).abs() < 0.05);
    }
}
