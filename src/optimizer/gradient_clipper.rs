use serde::{Deserialize, Serialize};

use crate::layers::ParamMut;

/// Gradient clipping methods
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum GradientClipper {
    /// Clip every gradient element into `[min, max]`
    ClipByValue { min: f32, max: f32 },

    /// Rescale all gradients together so their joint L2 norm is at most `max_norm`
    ClipByGlobalNorm { max_norm: f32 },

    /// No clipping
    None,
}

impl GradientClipper {
    /// L2 norm over every gradient reachable through `visit`.
    pub fn global_norm(visit: &dyn Fn(&mut dyn FnMut(ParamMut<'_>))) -> f32 {
        let mut norm_sq = 0.0f32;
        visit(&mut |p| norm_sq += p.grad.iter().map(|&g| g * g).sum::<f32>());
        norm_sq.sqrt()
    }

    /// Clip the gradients reachable through `visit` in place.
    ///
    /// Returns the global norm measured before clipping and whether any
    /// gradient was changed.
    pub fn clip(&self, visit: &dyn Fn(&mut dyn FnMut(ParamMut<'_>))) -> (f32, bool) {
        let norm = Self::global_norm(visit);
        match *self {
            GradientClipper::ClipByValue { min, max } => {
                let mut clipped = false;
                visit(&mut |mut p| {
                    p.grad.mapv_inplace(|g| {
                        let c = g.max(min).min(max);
                        clipped |= c != g;
                        c
                    })
                });
                (norm, clipped)
            }
            GradientClipper::ClipByGlobalNorm { max_norm } => {
                if norm > max_norm && norm.is_finite() {
                    let scale = max_norm / norm;
                    visit(&mut |mut p| p.grad.mapv_inplace(|g| g * scale));
                    (norm, true)
                } else {
                    (norm, false)
                }
            }
            GradientClipper::None => (norm, false),
        }
    }
}
