//! Identifier management for active variables.
//!
//! Two schemes are provided. [`LinearIndexManager`] hands out a fresh
//! identifier for every statement target and never reuses one, so the
//! identifiers recorded between two positions form a contiguous range.
//! [`ReuseIndexManager`] keeps a free list of released identifiers and
//! reissues them, which bounds the adjoint vector by the peak number of live
//! variables rather than by the number of statements.

use std::fmt;

use crate::statement::{Identifier, PASSIVE};

/// Issues identifiers for active variables.
///
/// The scheme is fixed for the lifetime of a tape: it is a type parameter of
/// [`JacobianTape`](crate::JacobianTape), not a runtime switch.
pub trait IndexManager: Default {
    /// `true` when identifiers are never reused.
    const IS_LINEAR: bool;

    /// Return a fresh identifier. Never [`PASSIVE`].
    fn generate(&mut self) -> Identifier;

    /// Give a live identifier back to the manager.
    fn free(&mut self, identifier: Identifier);

    /// Prepare `identifier` to become the target of a new statement.
    fn assign(&mut self, identifier: &mut Identifier);

    /// Snapshot of the counter, stored in tape positions.
    fn position(&self) -> Identifier;

    /// Rewind to a snapshot taken with [`position`](Self::position).
    fn reset_to(&mut self, position: Identifier);

    /// Called when the owning tape is fully reset.
    fn reset(&mut self);

    /// Largest identifier generated so far.
    fn largest_index(&self) -> Identifier;

    /// Number of identifiers currently held in reserve for reuse.
    fn unused_count(&self) -> usize {
        0
    }
}

/// Marker for index managers that reuse identifiers.
///
/// The editing operations (`erase`, `append`) copy identifiers verbatim
/// between recordings and are only implemented for tapes whose index manager
/// carries this marker.
///
/// ```compile_fail
/// let mut tape = adtape::LinearTape::<f64>::new();
/// let end = tape.position();
/// tape.erase(tape.zero_position(), end).unwrap();
/// ```
pub trait ReuseScheme: IndexManager {}

/// Monotonically increasing identifiers.
#[derive(Clone, Debug, Default)]
pub struct LinearIndexManager {
    count: Identifier,
}

impl IndexManager for LinearIndexManager {
    const IS_LINEAR: bool = true;

    #[inline]
    fn generate(&mut self) -> Identifier {
        self.count = self
            .count
            .checked_add(1)
            .expect("linear index manager ran out of identifiers");
        self.count
    }

    #[inline]
    fn free(&mut self, _identifier: Identifier) {}

    #[inline]
    fn assign(&mut self, identifier: &mut Identifier) {
        *identifier = self.generate();
    }

    #[inline]
    fn position(&self) -> Identifier {
        self.count
    }

    fn reset_to(&mut self, position: Identifier) {
        debug_assert!(position <= self.count);
        self.count = position;
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    #[inline]
    fn largest_index(&self) -> Identifier {
        self.count
    }
}

/// Identifiers recycled through a LIFO free list.
#[derive(Clone, Debug, Default)]
pub struct ReuseIndexManager {
    largest: Identifier,
    unused: Vec<Identifier>,
}

impl ReuseIndexManager {
    /// Identifiers currently waiting to be reissued, in reissue order from the back.
    pub fn unused(&self) -> &[Identifier] {
        &self.unused
    }
}

impl IndexManager for ReuseIndexManager {
    const IS_LINEAR: bool = false;

    #[inline]
    fn generate(&mut self) -> Identifier {
        match self.unused.pop() {
            Some(identifier) => identifier,
            None => {
                self.largest = self
                    .largest
                    .checked_add(1)
                    .expect("reuse index manager ran out of identifiers");
                self.largest
            }
        }
    }

    #[inline]
    fn free(&mut self, identifier: Identifier) {
        if identifier == PASSIVE {
            return;
        }
        assert!(
            identifier <= self.largest,
            "freeing identifier {identifier} which was never generated (largest is {})",
            self.largest
        );
        debug_assert!(
            !self.unused.contains(&identifier),
            "identifier {identifier} freed twice"
        );
        self.unused.push(identifier);
    }

    #[inline]
    fn assign(&mut self, identifier: &mut Identifier) {
        if *identifier == PASSIVE {
            *identifier = self.generate();
        }
    }

    #[inline]
    fn position(&self) -> Identifier {
        PASSIVE
    }

    fn reset_to(&mut self, _position: Identifier) {}

    fn reset(&mut self) {
        // Reissue low identifiers first so a fresh recording stays compact.
        self.unused.sort_unstable_by(|a, b| b.cmp(a));
    }

    #[inline]
    fn largest_index(&self) -> Identifier {
        self.largest
    }

    fn unused_count(&self) -> usize {
        self.unused.len()
    }
}

impl ReuseScheme for ReuseIndexManager {}

/// Snapshot of an index manager for tape statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexStatistics {
    pub linear: bool,
    pub largest_index: Identifier,
    pub unused: usize,
}

impl IndexStatistics {
    pub fn of<I: IndexManager>(manager: &I) -> Self {
        IndexStatistics {
            linear: I::IS_LINEAR,
            largest_index: manager.largest_index(),
            unused: manager.unused_count(),
        }
    }
}

impl fmt::Display for IndexStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.linear { "linear" } else { "reuse" };
        write!(
            f,
            "{scheme} indices: largest {}, {} held for reuse",
            self.largest_index, self.unused
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_never_reuses() {
        let mut m = LinearIndexManager::default();
        let a = m.generate();
        let b = m.generate();
        m.free(a);
        assert_eq!((a, b), (1, 2));
        assert_eq!(m.generate(), 3);

        let mut target = b;
        m.assign(&mut target);
        assert_eq!(target, 4);

        let snapshot = m.position();
        m.generate();
        m.reset_to(snapshot);
        assert_eq!(m.generate(), 5);
    }

    #[test]
    fn reuse_is_lifo() {
        let mut m = ReuseIndexManager::default();
        let ids: Vec<_> = (0..4).map(|_| m.generate()).collect();
        assert_eq!(ids, [1, 2, 3, 4]);

        m.free(2);
        m.free(4);
        assert_eq!(m.generate(), 4);
        assert_eq!(m.generate(), 2);
        assert_eq!(m.generate(), 5);
        assert_eq!(m.largest_index(), 5);
    }

    #[test]
    fn reuse_assign_keeps_live_identifier() {
        let mut m = ReuseIndexManager::default();
        let mut live = m.generate();
        m.assign(&mut live);
        assert_eq!(live, 1);

        let mut passive = PASSIVE;
        m.assign(&mut passive);
        assert_eq!(passive, 2);
    }

    #[test]
    fn reset_reissues_low_identifiers_first() {
        let mut m = ReuseIndexManager::default();
        for _ in 0..5 {
            m.generate();
        }
        m.free(2);
        m.free(5);
        m.free(1);
        m.reset();
        assert_eq!(m.unused(), &[5, 2, 1]);
        assert_eq!(m.generate(), 1);
        assert_eq!(m.generate(), 2);
        assert_eq!(m.generate(), 5);
    }

    #[test]
    #[should_panic(expected = "never generated")]
    fn free_unknown_identifier() {
        let mut m = ReuseIndexManager::default();
        m.generate();
        m.free(7);
    }
}
