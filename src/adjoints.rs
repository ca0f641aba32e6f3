//! Adjoint/tangent vector strategies.
//!
//! The tape never locks anything itself. A strategy decides how the vector
//! is stored and whether access is synchronized:
//!
//! - [`LocalAdjoints`] is a plain `Vec<F>` owned by the tape.
//! - [`SharedAdjoints`] is a cloneable handle to an `Arc<RwLock<Vec<F>>>`
//!   that several tapes (or threads) can hold. Every access takes the lock.
//!   Evaluating two tapes that share one vector at the same time is not
//!   supported; callers have to serialize such evaluations themselves.
//!
//! Raw access for replay goes through [`AdjointVector::begin_use`]. The
//! returned guard is the in-use region: while it lives the vector cannot be
//! resized, so the slice it hands out stays valid.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use crate::float::Float;

/// Storage strategy for the adjoint vector of a tape.
pub trait AdjointVector<F: Float> {
    /// Guard over the vector for the duration of an in-use region.
    type InUse<'a>: DerefMut<Target = Vec<F>>
    where
        Self: 'a;

    /// Enter an in-use region.
    fn begin_use(&mut self) -> Self::InUse<'_>;

    /// Number of slots.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index`, or `None` when out of range.
    fn read(&self, index: usize) -> Option<F>;

    /// Resize to exactly `size` slots; new slots are zero.
    fn resize(&mut self, size: usize) {
        self.begin_use().resize(size, F::zero());
    }

    /// Grow so that `index` is valid. Growth at least doubles the size.
    fn ensure(&mut self, index: usize) {
        let len = self.len();
        if index >= len {
            let size = (index + 1).max(len * 2);
            self.resize(size);
        }
    }

    /// Zero every slot without changing the size.
    fn clear(&mut self) {
        self.begin_use().fill(F::zero());
    }
}

/// Adjoint vector owned by one tape.
#[derive(Clone, Debug, Default)]
pub struct LocalAdjoints<F> {
    data: Vec<F>,
}

impl<F: Float> LocalAdjoints<F> {
    pub fn new() -> Self {
        LocalAdjoints { data: Vec::new() }
    }

    pub fn with_size(size: usize) -> Self {
        LocalAdjoints {
            data: vec![F::zero(); size],
        }
    }

    pub fn as_slice(&self) -> &[F] {
        &self.data
    }
}

impl<F: Float> AdjointVector<F> for LocalAdjoints<F> {
    type InUse<'a> = &'a mut Vec<F> where Self: 'a;

    #[inline]
    fn begin_use(&mut self) -> &mut Vec<F> {
        &mut self.data
    }

    #[inline]
    fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn read(&self, index: usize) -> Option<F> {
        self.data.get(index).copied()
    }
}

/// Lock-protected adjoint vector that can be shared between tapes.
#[derive(Debug, Default)]
pub struct SharedAdjoints<F> {
    data: Arc<RwLock<Vec<F>>>,
}

impl<F> Clone for SharedAdjoints<F> {
    fn clone(&self) -> Self {
        SharedAdjoints {
            data: Arc::clone(&self.data),
        }
    }
}

impl<F: Float> SharedAdjoints<F> {
    pub fn new() -> Self {
        SharedAdjoints {
            data: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn with_size(size: usize) -> Self {
        SharedAdjoints {
            data: Arc::new(RwLock::new(vec![F::zero(); size])),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<F> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether two handles refer to the same vector.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl<F: Float> AdjointVector<F> for SharedAdjoints<F> {
    type InUse<'a> = RwLockWriteGuard<'a, Vec<F>> where Self: 'a;

    fn begin_use(&mut self) -> RwLockWriteGuard<'_, Vec<F>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn len(&self) -> usize {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn read(&self, index: usize) -> Option<F> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .copied()
    }
}

/// Mutable access to one adjoint slot, holding the in-use region open.
pub struct GradientMut<'a, F: Float, A: AdjointVector<F> + 'a> {
    guard: A::InUse<'a>,
    index: usize,
}

impl<'a, F: Float, A: AdjointVector<F> + 'a> GradientMut<'a, F, A> {
    pub(crate) fn new(guard: A::InUse<'a>, index: usize) -> Self {
        GradientMut { guard, index }
    }
}

impl<'a, F: Float, A: AdjointVector<F> + 'a> Deref for GradientMut<'a, F, A> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.guard[self.index]
    }
}

impl<'a, F: Float, A: AdjointVector<F> + 'a> DerefMut for GradientMut<'a, F, A> {
    fn deref_mut(&mut self) -> &mut F {
        &mut self.guard[self.index]
    }
}
