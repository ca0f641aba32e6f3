//! Low-level (external) functions embedded in the statement stream.
//!
//! A low-level function replaces a whole sub-computation by one opaque block
//! on the tape. The block is a token naming a registered callback plus two
//! byte runs that only the callback understands:
//!
//! - fixed bytes, whose size the callback reports without looking at any data
//!   ([`LowLevelFunction::fixed_size`]);
//! - dynamic bytes, whose size the callback computes from the fixed bytes
//!   ([`LowLevelFunction::dynamic_size`], the non-mutating count call).
//!
//! Because both sizes can be recomputed at replay time, the tape stores no
//! size headers and can walk blocks backwards as easily as forwards.
//!
//! Functions with several inputs, some of which may be passive, usually
//! start their fixed bytes with an [`Activity`] mask so that the dynamic
//! size and the replay can skip the passive ones. [`StoreActions`] and
//! [`RestoreActions`] decide what to record and restore per argument.
//!
//! # Example
//!
//! ```
//! use adtape::lowlevel::{LowLevelFunction, VectorAccess};
//! use adtape::bytes::ByteReader;
//!
//! /// y = a * x for a recorded scale factor `a`.
//! struct Scale;
//!
//! impl LowLevelFunction<f64> for Scale {
//!     fn name(&self) -> &str { "scale" }
//!     fn fixed_size(&self) -> usize { 8 + 4 + 4 }
//!     fn dynamic_size(&self, _fixed: ByteReader<'_>) -> usize { 0 }
//!     fn forward(&self, mut fixed: ByteReader<'_>, _: ByteReader<'_>, v: &mut VectorAccess<'_, f64>) {
//!         let a: f64 = fixed.read();
//!         let (x, y) = (fixed.read_identifier(), fixed.read_identifier());
//!         v.set(y, a * v.get(x));
//!     }
//!     fn reverse(&self, mut fixed: ByteReader<'_>, _: ByteReader<'_>, v: &mut VectorAccess<'_, f64>) {
//!         let a: f64 = fixed.read();
//!         let (x, y) = (fixed.read_identifier(), fixed.read_identifier());
//!         let bar = v.take(y);
//!         v.update(x, a * bar);
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::bytes::{ByteReader, ByteWriter};
use crate::float::Float;
use crate::statement::{Identifier, PASSIVE};

/// Callback table entry for one kind of low-level function.
///
/// Replay always hands the callback its bytes in recording order, in both
/// directions.
pub trait LowLevelFunction<F: Float>: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Size of the fixed byte run of every block of this kind.
    fn fixed_size(&self) -> usize;

    /// Size of a block's dynamic byte run, derived from its fixed bytes.
    /// Must not have side effects.
    fn dynamic_size(&self, fixed: ByteReader<'_>) -> usize;

    /// Tangent propagation through the block.
    fn forward(&self, fixed: ByteReader<'_>, dynamic: ByteReader<'_>, vector: &mut VectorAccess<'_, F>);

    /// Adjoint propagation through the block.
    fn reverse(&self, fixed: ByteReader<'_>, dynamic: ByteReader<'_>, vector: &mut VectorAccess<'_, F>);

    /// Human-readable description of a block's byte layout.
    fn describe(&self, fixed: ByteReader<'_>, dynamic: ByteReader<'_>) -> String {
        format!(
            "{}: {} fixed bytes, {} dynamic bytes",
            self.name(),
            fixed.len(),
            dynamic.len()
        )
    }
}

/// Handle returned by [`JacobianTape::register_low_level_function`](crate::JacobianTape::register_low_level_function).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LowLevelFunctionToken(pub(crate) u16);

impl LowLevelFunctionToken {
    #[inline]
    pub fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for LowLevelFunctionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registered low-level functions of a tape, indexed by token.
pub struct Registry<F: Float> {
    functions: Vec<Arc<dyn LowLevelFunction<F>>>,
}

impl<F: Float> Clone for Registry<F> {
    fn clone(&self) -> Self {
        Registry {
            functions: self.functions.clone(),
        }
    }
}

impl<F: Float> Default for Registry<F> {
    fn default() -> Self {
        Registry {
            functions: Vec::new(),
        }
    }
}

impl<F: Float> fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.functions.iter().map(|func| func.name()))
            .finish()
    }
}

impl<F: Float> Registry<F> {
    pub fn register(&mut self, function: Arc<dyn LowLevelFunction<F>>) -> LowLevelFunctionToken {
        let index = self.functions.len();
        assert!(
            index <= u16::MAX as usize,
            "too many low-level functions registered"
        );
        self.functions.push(function);
        LowLevelFunctionToken(index as u16)
    }

    #[inline]
    pub fn get(&self, token: LowLevelFunctionToken) -> Option<&Arc<dyn LowLevelFunction<F>>> {
        self.functions.get(token.0 as usize)
    }

    /// Callback for a token found in a recorded stream. Recorded tokens were
    /// checked at push time, so a miss means the streams are corrupt.
    #[inline]
    pub(crate) fn expect(&self, token: LowLevelFunctionToken) -> &dyn LowLevelFunction<F> {
        match self.functions.get(token.0 as usize) {
            Some(function) => function.as_ref(),
            None => panic!(
                "low-level function token {token} is not registered ({} known)",
                self.functions.len()
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Access to the adjoint or tangent vector from inside a low-level function.
///
/// The same adapter serves both directions: in forward replay it wraps the
/// tangents, in reverse replay the adjoints.
pub struct VectorAccess<'a, F> {
    data: &'a mut [F],
}

impl<'a, F: Float> VectorAccess<'a, F> {
    pub(crate) fn new(data: &'a mut [F]) -> Self {
        VectorAccess { data }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, identifier: Identifier) -> F {
        self.data[identifier as usize]
    }

    #[inline]
    pub fn set(&mut self, identifier: Identifier, value: F) {
        self.data[identifier as usize] = value;
    }

    /// `vector[identifier] += delta`
    #[inline]
    pub fn update(&mut self, identifier: Identifier, delta: F) {
        let slot = &mut self.data[identifier as usize];
        *slot = *slot + delta;
    }

    #[inline]
    pub fn reset(&mut self, identifier: Identifier) {
        self.data[identifier as usize] = F::zero();
    }

    /// Read and zero a slot, as a reverse sweep does with an output's adjoint.
    #[inline]
    pub fn take(&mut self, identifier: Identifier) -> F {
        std::mem::replace(&mut self.data[identifier as usize], F::zero())
    }
}

// ── Helpers for writing low-level functions ──

/// Which inputs of a low-level function are active, stored as a bit mask in
/// the fixed bytes of its block.
///
/// The mask takes 1, 2, 4 or 8 bytes depending on the number of inputs, at
/// most 64.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Activity {
    bits: u64,
    arguments: usize,
}

impl Activity {
    pub const MAX_ARGUMENTS: usize = 64;

    /// All `arguments` inputs passive.
    pub fn new(arguments: usize) -> Self {
        assert!(
            arguments <= Self::MAX_ARGUMENTS,
            "activity of {arguments} arguments does not fit a mask of {} bits",
            Self::MAX_ARGUMENTS
        );
        Activity { bits: 0, arguments }
    }

    /// One entry per identifier; [`PASSIVE`] ones are inactive.
    pub fn of_identifiers(identifiers: &[Identifier]) -> Self {
        let mut activity = Self::new(identifiers.len());
        for (argument, &identifier) in identifiers.iter().enumerate() {
            activity.set(argument, identifier != PASSIVE);
        }
        activity
    }

    /// Bytes taken in the fixed data by the mask for `arguments` inputs.
    pub fn size(arguments: usize) -> usize {
        match arguments {
            0..=8 => 1,
            9..=16 => 2,
            17..=32 => 4,
            _ => 8,
        }
    }

    pub fn arguments(&self) -> usize {
        self.arguments
    }

    pub fn set(&mut self, argument: usize, active: bool) {
        assert!(argument < self.arguments, "argument {argument} out of {}", self.arguments);
        let bit = 1u64 << argument;
        if active {
            self.bits |= bit;
        } else {
            self.bits &= !bit;
        }
    }

    pub fn get(&self, argument: usize) -> bool {
        argument < self.arguments && self.bits & (1u64 << argument) != 0
    }

    /// Whether any input is active. A function without active inputs should
    /// not be recorded at all.
    pub fn any(&self) -> bool {
        self.bits != 0
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn store(&self, fixed: &mut ByteWriter<'_>) {
        match Self::size(self.arguments) {
            1 => fixed.write(self.bits as u8),
            2 => fixed.write(self.bits as u16),
            4 => fixed.write(self.bits as u32),
            _ => fixed.write(self.bits),
        }
    }

    /// Read back a mask written by [`store`](Self::store) for the same
    /// number of arguments.
    pub fn restore(arguments: usize, fixed: &mut ByteReader<'_>) -> Self {
        let bits = match Self::size(arguments) {
            1 => fixed.read::<u8>() as u64,
            2 => fixed.read::<u16>() as u64,
            4 => fixed.read::<u32>() as u64,
            _ => fixed.read::<u64>(),
        };
        let activity = Self::new(arguments);
        Activity { bits, ..activity }
    }
}

/// What to do for one argument while a low-level function is recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreActions {
    /// Record the input's primal value in the block.
    pub primal_create_on_tape: bool,
    /// Take the input's primal value for the passive evaluation.
    pub primal_extract: bool,
    /// Record the input's identifier in the block.
    pub input_identifier_store: bool,
    /// Register a new identifier for the output.
    pub output_identifier_create: bool,
}

impl StoreActions {
    pub fn new(
        tape_active: bool,
        is_input: bool,
        is_output: bool,
        input_active: bool,
        primal_required: bool,
    ) -> Self {
        StoreActions {
            primal_create_on_tape: tape_active && is_input && primal_required,
            primal_extract: is_input,
            input_identifier_store: tape_active && is_input && input_active,
            output_identifier_create: tape_active && is_output,
        }
    }
}

/// What to do for one argument while a low-level function is replayed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreActions {
    /// Read the input's primal value from the block.
    pub primal_restore: bool,
    /// Allocate room for the output's primal value.
    pub primal_create: bool,
    pub input_identifier_restore: bool,
    /// Allocate room for the input's derivative.
    pub input_gradient_create: bool,
    pub output_identifier_restore: bool,
    /// Allocate room for the output's derivative.
    pub output_gradient_create: bool,
}

impl RestoreActions {
    pub fn new(is_input: bool, is_output: bool, input_active: bool, primal_required: bool) -> Self {
        let input_primal = is_input && primal_required;
        RestoreActions {
            primal_restore: input_primal,
            primal_create: !input_primal && is_output,
            input_identifier_restore: is_input && input_active,
            input_gradient_create: is_input && input_active,
            output_identifier_restore: is_output,
            output_gradient_create: is_output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_width_follows_argument_count() {
        assert_eq!(Activity::size(0), 1);
        assert_eq!(Activity::size(8), 1);
        assert_eq!(Activity::size(9), 2);
        assert_eq!(Activity::size(32), 4);
        assert_eq!(Activity::size(33), 8);
        assert_eq!(Activity::size(64), 8);
    }

    #[test]
    fn activity_store_restore() {
        for arguments in [3, 12, 20, 64] {
            let mut activity = Activity::new(arguments);
            activity.set(0, true);
            activity.set(arguments - 1, true);
            activity.set(1, true);
            activity.set(1, false);

            let mut buf = vec![0u8; Activity::size(arguments)];
            let mut w = ByteWriter::new(&mut buf);
            activity.store(&mut w);
            assert_eq!(w.remaining(), 0);

            let back = Activity::restore(arguments, &mut ByteReader::new(&buf));
            assert_eq!(back, activity);
            assert!(back.get(0) && back.get(arguments - 1) && !back.get(1));
            assert_eq!(back.count(), 2);
        }
    }

    #[test]
    fn activity_of_identifiers() {
        let activity = Activity::of_identifiers(&[4, PASSIVE, 2]);
        assert!(activity.any());
        assert_eq!(activity.count(), 2);
        assert!(!activity.get(1));
        assert!(!Activity::of_identifiers(&[PASSIVE, PASSIVE]).any());
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn activity_is_limited() {
        Activity::new(65);
    }

    #[test]
    fn store_actions() {
        let passive_tape = StoreActions::new(false, true, false, true, true);
        assert_eq!(
            passive_tape,
            StoreActions {
                primal_extract: true,
                ..StoreActions::default()
            }
        );

        let active_input = StoreActions::new(true, true, false, true, true);
        assert!(active_input.primal_create_on_tape);
        assert!(active_input.input_identifier_store);
        assert!(!active_input.output_identifier_create);

        let output = StoreActions::new(true, false, true, false, false);
        assert!(output.output_identifier_create && !output.primal_extract);
    }

    #[test]
    fn restore_actions() {
        let passive_input = RestoreActions::new(true, false, false, true);
        assert!(passive_input.primal_restore);
        assert!(!passive_input.input_identifier_restore);

        let in_out = RestoreActions::new(true, true, true, false);
        assert!(in_out.primal_create && !in_out.primal_restore);
        assert!(in_out.input_gradient_create && in_out.output_gradient_create);
    }
}
