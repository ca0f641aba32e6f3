//! Elementary operations and their local partial derivatives.
//!
//! The tape itself only stores `(partial, identifier)` pairs. This module is
//! what the [`active`](crate::active) front end uses to compute them: each
//! operation is a tag, and [`evaluate`] / [`partials`] are plain functions
//! dispatching on it.

use crate::float::Float;

/// Elementary operation tag.
///
/// Binary operations use both operands. Unary operations ignore the second
/// one, except [`Operation::Powi`] whose integer exponent is carried in the
/// tag itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    // Binary
    Add,
    Sub,
    Mul,
    Div,
    Powf,
    Atan2,
    Hypot,
    Max,
    Min,

    // Unary
    Neg,
    Recip,
    Sqrt,
    Powi(i32),
    Exp,
    Ln,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Abs,
}

impl Operation {
    /// Whether the second operand takes part in the operation.
    #[inline]
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Operation::Add
                | Operation::Sub
                | Operation::Mul
                | Operation::Div
                | Operation::Powf
                | Operation::Atan2
                | Operation::Hypot
                | Operation::Max
                | Operation::Min
        )
    }
}

/// Primal value of `op(a, b)`.
#[inline]
pub fn evaluate<F: Float>(op: Operation, a: F, b: F) -> F {
    match op {
        Operation::Add => a + b,
        Operation::Sub => a - b,
        Operation::Mul => a * b,
        Operation::Div => a / b,
        Operation::Powf => a.powf(b),
        Operation::Atan2 => a.atan2(b),
        Operation::Hypot => a.hypot(b),
        Operation::Max => {
            if a >= b {
                a
            } else {
                b
            }
        }
        Operation::Min => {
            if a <= b {
                a
            } else {
                b
            }
        }

        Operation::Neg => -a,
        Operation::Recip => a.recip(),
        Operation::Sqrt => a.sqrt(),
        Operation::Powi(n) => a.powi(n),
        Operation::Exp => a.exp(),
        Operation::Ln => a.ln(),
        Operation::Sin => a.sin(),
        Operation::Cos => a.cos(),
        Operation::Tan => a.tan(),
        Operation::Asin => a.asin(),
        Operation::Acos => a.acos(),
        Operation::Atan => a.atan(),
        Operation::Sinh => a.sinh(),
        Operation::Cosh => a.cosh(),
        Operation::Tanh => a.tanh(),
        Operation::Abs => a.abs(),
    }
}

/// Local partials `(∂r/∂a, ∂r/∂b)` of `r = op(a, b)`.
///
/// `r` is the already computed result; several formulas reuse it.
#[inline]
pub fn partials<F: Float>(op: Operation, a: F, b: F, r: F) -> (F, F) {
    let zero = F::zero();
    let one = F::one();
    match op {
        Operation::Add => (one, one),
        Operation::Sub => (one, -one),
        Operation::Mul => (b, a),
        Operation::Div => {
            let inv = one / b;
            (inv, -a * inv * inv)
        }
        Operation::Powf => (b * a.powf(b - one), r * a.ln()),
        Operation::Atan2 => {
            let denom = a * a + b * b;
            (b / denom, -a / denom)
        }
        Operation::Hypot => (a / r, b / r),
        Operation::Max => {
            if a >= b {
                (one, zero)
            } else {
                (zero, one)
            }
        }
        Operation::Min => {
            if a <= b {
                (one, zero)
            } else {
                (zero, one)
            }
        }

        Operation::Neg => (-one, zero),
        Operation::Recip => {
            let inv = one / a;
            (-inv * inv, zero)
        }
        Operation::Sqrt => (one / (r + r), zero),
        Operation::Powi(0) => (zero, zero),
        Operation::Powi(n) => {
            let scale = F::from_i32(n).unwrap_or_else(F::zero);
            let power = match n.checked_sub(1) {
                Some(m) => a.powi(m),
                None => a.powi(n) / a,
            };
            (scale * power, zero)
        }
        Operation::Exp => (r, zero),
        Operation::Ln => (one / a, zero),
        Operation::Sin => (a.cos(), zero),
        Operation::Cos => (-a.sin(), zero),
        Operation::Tan => {
            let c = a.cos();
            (one / (c * c), zero)
        }
        Operation::Asin => (one / (one - a * a).sqrt(), zero),
        Operation::Acos => (-one / (one - a * a).sqrt(), zero),
        Operation::Atan => (one / (one + a * a), zero),
        Operation::Sinh => (a.cosh(), zero),
        Operation::Cosh => (a.sinh(), zero),
        Operation::Tanh => (one - r * r, zero),
        Operation::Abs => (a.signum(), zero),
    }
}
