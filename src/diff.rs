// SPDX-License-Identifier: MIT

//! Differentiable vectors.
//!
//! [`DiffVector`] wraps the array library's reverse-mode autodiff: marking a
//! vector as requiring gradients turns it into a graph leaf, arithmetic on it
//! records onto the library's graph, and [`backward`] seeds the result with
//! ones and distributes gradients back to every live tracked leaf.
//!
//! Leaves are tracked in a process-wide tape. Each entry holds a weak
//! reference to the leaf's gradient slot, so dropping the last `DiffVector`
//! for a leaf retires its entry on the next [`backward`] pass.

use crate::array::{FloatElement, Vector};
use crate::error::Result;
use candle_core::{Tensor, Var};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError, Weak};

type GradSlot = Arc<Mutex<Option<Tensor>>>;

struct TapeEntry {
    /// The graph leaf this entry distributes gradients to.
    leaf: Tensor,
    grad: Weak<Mutex<Option<Tensor>>>,
}

static TAPE: Mutex<Vec<TapeEntry>> = Mutex::new(Vec::new());

fn with_tape<R>(f: impl FnOnce(&mut Vec<TapeEntry>) -> R) -> R {
    let mut tape = TAPE.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut tape)
}

/// Number of live tracked leaves.
#[must_use]
pub fn tape_len() -> usize {
    with_tape(|tape| {
        tape.retain(|e| e.grad.strong_count() > 0);
        tape.len()
    })
}

/// Drop all tracked leaves. Gradient slots of live vectors are untouched,
/// but they will no longer receive gradients from future [`backward`] calls.
pub fn clear_tape() {
    with_tape(Vec::clear);
}

/// A gradient-tracking GPU vector.
///
/// Behaves like [`Vector`] for the floating-point operations it mirrors, but
/// every operation records onto the autodiff graph.
#[derive(Debug, Clone)]
pub struct DiffVector<T: FloatElement> {
    tensor: Tensor,
    grad: GradSlot,
    requires_grad: bool,
    _elem: PhantomData<T>,
}

impl<T: FloatElement> DiffVector<T> {
    fn wrap(tensor: Tensor) -> Self {
        Self {
            tensor,
            grad: Arc::new(Mutex::new(None)),
            requires_grad: false,
            _elem: PhantomData,
        }
    }

    /// Lift a plain vector into the differentiable domain (untracked).
    #[must_use]
    pub fn from_vector(value: &Vector<T>) -> Self {
        Self::wrap(value.tensor().clone())
    }

    /// Upload host data as an untracked differentiable vector.
    pub fn from_slice(data: &[T]) -> Result<Self> {
        Ok(Self::from_vector(&Vector::from_slice(data)?))
    }

    /// A zero-filled untracked vector.
    pub fn zeros(size: usize) -> Result<Self> {
        Ok(Self::from_vector(&Vector::zeros(size)?))
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensor.dim(0).unwrap_or(0)
    }

    /// Whether the vector is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this vector is a tracked graph leaf.
    #[must_use]
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Enable or disable gradient tracking.
    ///
    /// Enabling replaces the current value with a fresh graph leaf and
    /// registers it on the tape; disabling detaches from the graph.
    pub fn set_requires_grad(&mut self, enabled: bool) -> Result<()> {
        if enabled && !self.requires_grad {
            let var = Var::from_tensor(&self.tensor.detach())?;
            let leaf = var.as_tensor().clone();
            with_tape(|tape| {
                tape.retain(|e| e.grad.strong_count() > 0);
                tape.push(TapeEntry {
                    leaf: leaf.clone(),
                    grad: Arc::downgrade(&self.grad),
                });
            });
            self.tensor = leaf;
            self.requires_grad = true;
        } else if !enabled && self.requires_grad {
            self.tensor = self.tensor.detach();
            self.requires_grad = false;
        }
        Ok(())
    }

    /// The accumulated gradient, if [`backward`] has reached this leaf.
    pub fn grad(&self) -> Result<Option<Vector<T>>> {
        let slot = self.grad.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref()
            .map(|g| Vector::from_tensor(g.clone()))
            .transpose()
    }

    /// Overwrite the gradient slot, e.g. to reset between optimizer steps.
    pub fn set_grad(&self, value: Option<&Vector<T>>) {
        let mut slot = self.grad.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = value.map(|v| v.tensor().clone());
    }

    /// The current value, cut loose from the graph.
    pub fn detach(&self) -> Result<Vector<T>> {
        Vector::from_tensor(self.tensor.detach())
    }

    /// Download to a host vector.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        Ok(self.tensor.to_vec1()?)
    }

    // --- graph-recording arithmetic ---------------------------------------

    /// Elementwise sum.
    pub fn add(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap((&self.tensor + &rhs.tensor)?))
    }

    /// Elementwise difference.
    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap((&self.tensor - &rhs.tensor)?))
    }

    /// Elementwise product.
    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap((&self.tensor * &rhs.tensor)?))
    }

    /// Elementwise quotient.
    pub fn div(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap((&self.tensor / &rhs.tensor)?))
    }

    /// Elementwise negation.
    pub fn neg(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.neg()?))
    }

    /// Elementwise square root.
    pub fn sqrt(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.sqrt()?))
    }

    /// Elementwise reciprocal square root.
    pub fn rsqrt(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.sqrt()?.recip()?))
    }

    /// Elementwise reciprocal.
    pub fn rcp(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.recip()?))
    }

    /// Elementwise natural exponential.
    pub fn exp(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.exp()?))
    }

    /// Elementwise natural logarithm.
    pub fn log(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.log()?))
    }

    /// Elementwise sine.
    pub fn sin(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.sin()?))
    }

    /// Elementwise cosine.
    pub fn cos(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.cos()?))
    }

    /// Elementwise tangent.
    pub fn tan(&self) -> Result<Self> {
        Ok(Self::wrap((self.tensor.sin()? / self.tensor.cos()?)?))
    }

    /// Elementwise hyperbolic tangent.
    pub fn tanh(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.tanh()?))
    }

    /// Elementwise error function.
    pub fn erf(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.erf()?))
    }

    /// Elementwise power with a scalar exponent.
    pub fn powf(&self, exponent: f64) -> Result<Self> {
        Ok(Self::wrap(self.tensor.powf(exponent)?))
    }

    /// Horizontal sum, kept as a length-1 vector so it stays on the graph.
    pub fn hsum(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.sum_keepdim(0)?))
    }
}

/// Run reverse-mode differentiation from `result`.
///
/// The result is seeded with a gradient of all ones. Every live tracked leaf
/// that `result` depends on receives its accumulated gradient; leaves outside
/// the graph keep their previous gradient. Entries whose vectors have all
/// been dropped are retired.
pub fn backward<T: FloatElement>(result: &DiffVector<T>) -> Result<()> {
    let store = result.tensor.backward()?;
    with_tape(|tape| {
        tape.retain(|entry| {
            let Some(slot) = entry.grad.upgrade() else {
                return false;
            };
            if let Some(grad) = store.get(&entry.leaf) {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                *slot = Some(grad.clone());
            }
            true
        });
    });
    Ok(())
}
