//! Minimal front end: values that record themselves on an explicit tape.
//!
//! [`Active<F>`] pairs a primal value with its identifier. It is deliberately
//! not `Copy`: under identifier reuse an identifier must have exactly one
//! owner, so copies go through [`JacobianTape::copy`], which records a copy
//! statement and hands out a fresh identifier.
//!
//! Dropping an `Active` does not give its identifier back; call
//! [`Active::release`] for that. Leaked identifiers only cost adjoint vector
//! slots.
//!
//! ```
//! use adtape::{Operation, ReuseTape};
//!
//! let mut tape = ReuseTape::<f64>::new();
//! let x = tape.input(0.5);
//! let y = tape.input(2.0);
//! let s = tape.unary(Operation::Sin, &x);
//! let mut z = tape.binary(Operation::Mul, &s, &y);
//! tape.mark_output(&mut z);
//!
//! tape.seed_of(&z, 1.0);
//! tape.evaluate();
//! assert!((tape.gradient_of(&x) - 2.0 * 0.5f64.cos()).abs() < 1e-12);
//! assert!((tape.gradient_of(&y) - 0.5f64.sin()).abs() < 1e-12);
//! ```

use crate::adjoints::AdjointVector;
use crate::float::Float;
use crate::index::IndexManager;
use crate::operation::{self, Operation};
use crate::statement::{Identifier, PASSIVE};
use crate::tape::JacobianTape;

/// A value whose derivatives are tracked by a tape.
#[derive(Debug, PartialEq)]
pub struct Active<F> {
    value: F,
    identifier: Identifier,
}

impl<F: Float> Active<F> {
    /// A passive value. Statements that only read constants are not recorded.
    pub fn constant(value: F) -> Self {
        Active {
            value,
            identifier: PASSIVE,
        }
    }

    #[inline]
    pub fn value(&self) -> F {
        self.value
    }

    #[inline]
    pub fn identifier(&self) -> Identifier {
        self.identifier
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.identifier != PASSIVE
    }

    /// Give the identifier back to the tape's index manager.
    pub fn release<I: IndexManager, A: AdjointVector<F>>(mut self, tape: &mut JacobianTape<F, I, A>) {
        tape.release(&mut self.identifier);
    }

    #[inline]
    fn operand(&self) -> (F, Identifier) {
        (self.value, self.identifier)
    }
}

impl<F: Float, I: IndexManager, A: AdjointVector<F>> JacobianTape<F, I, A> {
    /// Record `target = op(a, b)` and return the primal result.
    fn record(
        &mut self,
        target: &mut Identifier,
        op: Operation,
        (a, a_id): (F, Identifier),
        (b, b_id): (F, Identifier),
    ) -> F {
        let result = operation::evaluate(op, a, b);
        let (da, db) = operation::partials(op, a, b, result);
        if op.is_binary() {
            self.store(target, &[(da, a_id), (db, b_id)]);
        } else {
            self.store(target, &[(da, a_id)]);
        }
        result
    }

    /// New independent variable.
    pub fn input(&mut self, value: F) -> Active<F> {
        Active {
            value,
            identifier: self.register_input(),
        }
    }

    pub fn unary(&mut self, op: Operation, a: &Active<F>) -> Active<F> {
        let mut out = Active::constant(F::zero());
        self.unary_into(&mut out, op, a);
        out
    }

    pub fn binary(&mut self, op: Operation, a: &Active<F>, b: &Active<F>) -> Active<F> {
        let mut out = Active::constant(F::zero());
        self.binary_into(&mut out, op, a, b);
        out
    }

    /// `target = op(a)`, recorded into an existing variable.
    pub fn unary_into(&mut self, target: &mut Active<F>, op: Operation, a: &Active<F>) {
        debug_assert!(!op.is_binary(), "{op:?} takes two operands");
        let zero = (F::zero(), PASSIVE);
        target.value = self.record(&mut target.identifier, op, a.operand(), zero);
    }

    /// `target = op(a, b)`, recorded into an existing variable.
    pub fn binary_into(&mut self, target: &mut Active<F>, op: Operation, a: &Active<F>, b: &Active<F>) {
        debug_assert!(op.is_binary(), "{op:?} takes one operand");
        target.value = self.record(&mut target.identifier, op, a.operand(), b.operand());
    }

    /// `target = op(target)`. Under identifier reuse `target` keeps its
    /// identifier.
    pub fn apply(&mut self, target: &mut Active<F>, op: Operation) {
        debug_assert!(!op.is_binary(), "{op:?} takes two operands");
        let operand = target.operand();
        target.value = self.record(&mut target.identifier, op, operand, (F::zero(), PASSIVE));
    }

    /// `target = op(target, rhs)`, e.g. `x *= y`.
    pub fn apply_with(&mut self, target: &mut Active<F>, op: Operation, rhs: &Active<F>) {
        debug_assert!(op.is_binary(), "{op:?} takes one operand");
        let operand = target.operand();
        target.value = self.record(&mut target.identifier, op, operand, rhs.operand());
    }

    /// A copy of `a` with its own identifier.
    pub fn copy(&mut self, a: &Active<F>) -> Active<F> {
        let mut out = Active::constant(a.value);
        self.assign(&mut out, a);
        out
    }

    /// `target = value`, recorded as a copy statement.
    pub fn assign(&mut self, target: &mut Active<F>, value: &Active<F>) {
        target.value = value.value;
        self.store(&mut target.identifier, &[(F::one(), value.identifier)]);
    }

    /// `target = constant`.
    pub fn assign_constant(&mut self, target: &mut Active<F>, value: F) {
        target.value = value;
        self.store_passive(&mut target.identifier);
    }

    /// Give a dependent variable its own identifier before seeding it.
    pub fn mark_output(&mut self, a: &mut Active<F>) {
        self.register_output(&mut a.identifier);
    }

    /// Adjoint (or tangent) of `a`, with relaxed bounds checking.
    pub fn gradient_of(&self, a: &Active<F>) -> F {
        if a.is_active() {
            self.gradient(a.identifier)
        } else {
            F::zero()
        }
    }

    /// Set the adjoint (or tangent) of `a`. Ignored for passive values.
    pub fn seed_of(&mut self, a: &Active<F>, value: F) {
        self.seed(a.identifier, value);
    }
}
