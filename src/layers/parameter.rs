use ndarray::{Array, ArrayViewMutD, Dimension};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PARAM_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identity of a trainable tensor.
///
/// Two handles to the same shared block report the same ids, which is how
/// updaters avoid stepping a shared parameter twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(u64);

impl ParamId {
    fn fresh() -> Self {
        ParamId(NEXT_PARAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A trainable tensor together with its accumulated gradient.
#[derive(Debug)]
pub struct Parameter<D: Dimension> {
    id: ParamId,
    pub value: Array<f32, D>,
    pub grad: Array<f32, D>,
}

impl<D: Dimension> Parameter<D> {
    pub fn new(value: Array<f32, D>) -> Self {
        let grad = Array::zeros(value.raw_dim());
        Parameter {
            id: ParamId::fresh(),
            value,
            grad,
        }
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Borrow value and gradient as dynamic-rank views for optimizers and visitors.
    pub fn as_param_mut(&mut self) -> ParamMut<'_> {
        ParamMut {
            id: self.id,
            value: self.value.view_mut().into_dyn(),
            grad: self.grad.view_mut().into_dyn(),
        }
    }
}

/// Cloning produces an independent parameter with a new identity.
/// Target networks rely on this to never alias the live copy.
impl<D: Dimension> Clone for Parameter<D> {
    fn clone(&self) -> Self {
        Parameter {
            id: ParamId::fresh(),
            value: self.value.clone(),
            grad: Array::zeros(self.value.raw_dim()),
        }
    }
}

/// Mutable, rank-erased view of one parameter.
pub struct ParamMut<'a> {
    pub id: ParamId,
    pub value: ArrayViewMutD<'a, f32>,
    pub grad: ArrayViewMutD<'a, f32>,
}

/// Anything owning trainable parameters.
pub trait Parameterized {
    /// Call `f` once for every parameter, in a fixed structural order.
    fn visit_parameters(&mut self, f: &mut dyn FnMut(ParamMut<'_>));

    fn zero_grad(&mut self) {
        self.visit_parameters(&mut |mut p| p.grad.fill(0.0));
    }

    fn num_parameters(&mut self) -> usize {
        let mut count = 0;
        self.visit_parameters(&mut |p| count += p.value.len());
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_clone_gets_new_identity() {
        let p = Parameter::new(array![1.0f32, 2.0]);
        let q = p.clone();
        assert_ne!(p.id(), q.id());
        assert_eq!(p.value, q.value);
    }

    #[test]
    fn test_zero_grad() {
        let mut p = Parameter::new(array![[1.0f32, 2.0]]);
        p.grad.fill(3.0);
        p.zero_grad();
        assert!(p.grad.iter().all(|&g| g == 0.0));
    }
}
