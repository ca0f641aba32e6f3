//! Jacobian tape: records statements as target identifiers plus
//! `(partial, argument)` pairs and replays them in either direction.
//!
//! The recording lives in five chunked streams that advance in lockstep:
//!
//! | stream        | item                                   |
//! |---------------|----------------------------------------|
//! | statements    | `(target identifier, argument count)`  |
//! | Jacobians     | `(partial, argument identifier)`       |
//! | tokens        | `(token, largest identifier in the block)` |
//! | fixed bytes   | low-level block data of known size     |
//! | dynamic bytes | low-level block data sized by its callback |
//!
//! A [`Position`] is a cut through all five streams at once. Replay, clearing
//! and editing operate on the statements between two positions.
//!
//! # Example
//!
//! ```
//! use adtape::{ReuseTape, PASSIVE};
//!
//! let mut tape = ReuseTape::<f64>::new();
//! let (x, y) = (2.0, 3.0);
//! let x_id = tape.register_input();
//! let y_id = tape.register_input();
//!
//! // t = x * y
//! let mut t_id = PASSIVE;
//! tape.store(&mut t_id, &[(y, x_id), (x, y_id)]);
//! // z = t + x
//! let mut z_id = PASSIVE;
//! tape.store(&mut z_id, &[(1.0, t_id), (1.0, x_id)]);
//!
//! tape.seed(z_id, 1.0);
//! tape.evaluate();
//! assert_eq!(tape.gradient(x_id), 4.0);
//! assert_eq!(tape.gradient(y_id), 2.0);
//! ```

use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::adjoints::{AdjointVector, GradientMut, LocalAdjoints};
use crate::bytes::{ByteReader, ByteWriter};
use crate::chunked::{ChunkPosition, ChunkedData};
use crate::config::{BoundsChecking, TapeConfig};
use crate::error::Error;
use crate::float::Float;
use crate::index::{IndexManager, IndexStatistics, LinearIndexManager, ReuseIndexManager};
use crate::lowlevel::{LowLevelFunction, LowLevelFunctionToken, Registry};
use crate::statement::{ArgumentCount, Identifier, StatementKind, PASSIVE};

// Submodules add impl blocks to JacobianTape
mod edit;
mod evaluate;

/// Cut through every stream of a tape.
///
/// Positions compare by statement stream first. They stay valid until the
/// tape is reset, or erased, before them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub(crate) statements: ChunkPosition,
    pub(crate) jacobians: ChunkPosition,
    pub(crate) tokens: ChunkPosition,
    pub(crate) fixed: ChunkPosition,
    pub(crate) dynamic: ChunkPosition,
    /// Counter of a linear index manager; unused by reuse managers.
    pub(crate) index: Identifier,
}

impl Position {
    /// Cut in the statement stream.
    pub fn statements(&self) -> ChunkPosition {
        self.statements
    }
}

/// The recording proper, separate from identifier and adjoint management so
/// that replay and editing can borrow it next to the adjoint vector.
#[derive(Clone, Debug)]
pub(crate) struct Streams<F> {
    pub(crate) statements: ChunkedData<Identifier, ArgumentCount>,
    pub(crate) jacobians: ChunkedData<F, Identifier>,
    /// Each block's token, with the largest identifier written into its data.
    pub(crate) tokens: ChunkedData<LowLevelFunctionToken, Identifier>,
    pub(crate) fixed: ChunkedData<u8>,
    pub(crate) dynamic: ChunkedData<u8>,
    /// Largest identifier named by any recorded statement, Jacobian entry or
    /// low-level block.
    pub(crate) largest: Identifier,
}

impl<F: Float> Streams<F> {
    fn new(config: &TapeConfig) -> Self {
        Streams {
            statements: ChunkedData::new(config.statement_chunk_size),
            jacobians: ChunkedData::new(config.jacobian_chunk_size),
            tokens: ChunkedData::new(config.token_chunk_size),
            fixed: ChunkedData::new(config.byte_chunk_size),
            dynamic: ChunkedData::new(config.byte_chunk_size),
            largest: PASSIVE,
        }
    }

    pub(crate) fn position(&self, index: Identifier) -> Position {
        Position {
            statements: self.statements.position(),
            jacobians: self.jacobians.position(),
            tokens: self.tokens.position(),
            fixed: self.fixed.position(),
            dynamic: self.dynamic.position(),
            index,
        }
    }

    pub(crate) fn contains(&self, position: &Position) -> bool {
        self.statements.contains(position.statements)
            && self.jacobians.contains(position.jacobians)
            && self.tokens.contains(position.tokens)
            && self.fixed.contains(position.fixed)
            && self.dynamic.contains(position.dynamic)
    }

    fn reset_to(&mut self, position: &Position) {
        self.statements.reset_to(position.statements);
        self.jacobians.reset_to(position.jacobians);
        self.tokens.reset_to(position.tokens);
        self.fixed.reset_to(position.fixed);
        self.dynamic.reset_to(position.dynamic);
    }

    fn reset(&mut self) {
        self.reset_to(&Position::default());
        self.largest = PASSIVE;
    }

    /// Push a statement. The caller has reserved room for it.
    #[inline]
    pub(crate) fn push_statement(&mut self, target: Identifier, kind: StatementKind) {
        self.largest = self.largest.max(target);
        self.statements.push_data(target, kind.encode());
    }

    /// Push a Jacobian entry. The caller has reserved room for it.
    #[inline]
    pub(crate) fn push_jacobian(&mut self, partial: F, argument: Identifier) {
        self.largest = self.largest.max(argument);
        self.jacobians.push_data(partial, argument);
    }

    /// Push a low-level block statement and reserve its byte runs, returning
    /// write views over them. The block is completed by
    /// [`close_block`](Self::close_block) once its data is written.
    pub(crate) fn push_block(
        &mut self,
        fixed_size: usize,
        dynamic_size: usize,
    ) -> (ByteWriter<'_>, ByteWriter<'_>) {
        self.statements.reserve(1);
        self.statements
            .push_data(PASSIVE, StatementKind::LowLevelFunction.encode());
        let fixed = ByteWriter::new(self.fixed.push_zeroed(fixed_size));
        let dynamic = ByteWriter::new(self.dynamic.push_zeroed(dynamic_size));
        (fixed, dynamic)
    }

    /// Record the token of the block pushed last, with the largest
    /// identifier its data refers to.
    pub(crate) fn close_block(&mut self, token: LowLevelFunctionToken, largest: Identifier) {
        self.largest = self.largest.max(largest);
        self.tokens.reserve(1);
        self.tokens.push_data(token, largest);
    }
}

/// A Jacobian tape.
///
/// The index manager `I` and the adjoint vector strategy `A` are fixed at
/// construction. Editing is only available when `I` reuses identifiers
/// (see [`ReuseScheme`](crate::index::ReuseScheme)).
pub struct JacobianTape<
    F: Float,
    I: IndexManager = ReuseIndexManager,
    A: AdjointVector<F> = LocalAdjoints<F>,
> {
    pub(crate) streams: Streams<F>,
    pub(crate) registry: Registry<F>,
    pub(crate) indices: I,
    pub(crate) adjoints: A,
    pub(crate) config: TapeConfig,
    active: bool,
}

/// Tape that recycles identifiers; supports editing.
pub type ReuseTape<F> = JacobianTape<F, ReuseIndexManager>;

/// Tape with monotonically increasing identifiers.
pub type LinearTape<F> = JacobianTape<F, LinearIndexManager>;

impl<F: Float, I: IndexManager, A: AdjointVector<F> + Default> Default for JacobianTape<F, I, A> {
    fn default() -> Self {
        Self::with_config(TapeConfig::default())
    }
}

impl<F: Float, I: IndexManager, A: AdjointVector<F> + Default> JacobianTape<F, I, A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TapeConfig) -> Self {
        Self::with_adjoints(config, A::default())
    }
}

impl<F: Float, I: IndexManager, A: AdjointVector<F>> JacobianTape<F, I, A> {
    /// Create a tape around an existing adjoint vector, e.g. a
    /// [`SharedAdjoints`](crate::adjoints::SharedAdjoints) handle.
    pub fn with_adjoints(config: TapeConfig, mut adjoints: A) -> Self {
        if adjoints.len() < config.initial_adjoint_size {
            adjoints.resize(config.initial_adjoint_size);
        }
        JacobianTape {
            streams: Streams::new(&config),
            registry: Registry::default(),
            indices: I::default(),
            adjoints,
            config,
            active: true,
        }
    }

    pub fn config(&self) -> &TapeConfig {
        &self.config
    }

    // ── Activity ──

    /// Tapes are active when created.
    pub fn set_active(&mut self) {
        self.active = true;
    }

    /// Stop recording. Statements stored while passive release their target.
    pub fn set_passive(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    // ── Recording ──

    /// Record `target = f(arguments)` through its local partials.
    ///
    /// Passive arguments are skipped. When none remain, or the tape is
    /// passive, the target's identifier is released and nothing is recorded.
    pub fn store(&mut self, target: &mut Identifier, arguments: &[(F, Identifier)]) {
        if !self.active {
            self.release(target);
            return;
        }
        let active = arguments.iter().filter(|(_, id)| *id != PASSIVE).count();
        if active == 0 {
            self.release(target);
            return;
        }

        let kind = StatementKind::normal(active);
        self.streams.statements.reserve(1);
        self.streams.jacobians.reserve(active);
        for &(partial, argument) in arguments {
            if argument != PASSIVE {
                self.streams.push_jacobian(partial, argument);
            }
        }
        self.indices.assign(target);
        self.streams.push_statement(*target, kind);
    }

    /// The target received a passive value.
    #[inline]
    pub fn store_passive(&mut self, target: &mut Identifier) {
        self.release(target);
    }

    /// Give `identifier` back to the index manager and make it passive.
    #[inline]
    pub fn release(&mut self, identifier: &mut Identifier) {
        self.indices.free(*identifier);
        *identifier = PASSIVE;
    }

    /// New independent variable. Returns [`PASSIVE`] while the tape is
    /// passive.
    ///
    /// Also used for the outputs of low-level functions, which must be
    /// registered before the block that writes them is pushed.
    pub fn register_input(&mut self) -> Identifier {
        if !self.active {
            return PASSIVE;
        }
        self.streams.statements.reserve(1);
        let identifier = self.indices.generate();
        self.streams.push_statement(identifier, StatementKind::Input);
        identifier
    }

    /// Give a dependent variable its own identifier by recording a copy
    /// statement. The old identifier is released.
    pub fn register_output(&mut self, identifier: &mut Identifier) {
        if *identifier == PASSIVE || !self.active {
            return;
        }
        let mut output = PASSIVE;
        self.store(&mut output, &[(F::one(), *identifier)]);
        self.indices.free(*identifier);
        *identifier = output;
    }

    // ── Low-level functions ──

    pub fn register_low_level_function(
        &mut self,
        function: Arc<dyn LowLevelFunction<F>>,
    ) -> LowLevelFunctionToken {
        self.registry.register(function)
    }

    pub fn registry(&self) -> &Registry<F> {
        &self.registry
    }

    /// Record a low-level function block.
    ///
    /// Reserves `fixed_size` and `dynamic_size` bytes and lets `write` fill
    /// them. Both views must be filled exactly, `fixed_size` must match the
    /// callback's [`fixed_size`](LowLevelFunction::fixed_size) and
    /// `dynamic_size` must match what its
    /// [`dynamic_size`](LowLevelFunction::dynamic_size) reports for the
    /// written fixed bytes. Any mismatch panics.
    ///
    /// Identifiers the block refers to should be written with
    /// [`ByteWriter::write_identifier`] so that automatic adjoint vector
    /// management covers them, also after the block is appended to another
    /// tape.
    ///
    /// Nothing is recorded, and `write` is not called, while the tape is
    /// passive.
    pub fn push_low_level_function<W>(
        &mut self,
        token: LowLevelFunctionToken,
        fixed_size: usize,
        dynamic_size: usize,
        write: W,
    ) where
        W: FnOnce(&mut ByteWriter<'_>, &mut ByteWriter<'_>),
    {
        let function = self.registry.expect(token);
        assert_eq!(
            fixed_size,
            function.fixed_size(),
            "low-level function `{}` ({token}) has {} fixed bytes, {fixed_size} requested",
            function.name(),
            function.fixed_size()
        );
        if !self.active {
            return;
        }

        let (mut fixed, mut dynamic) = self.streams.push_block(fixed_size, dynamic_size);
        write(&mut fixed, &mut dynamic);
        assert!(
            fixed.remaining() == 0 && dynamic.remaining() == 0,
            "low-level function `{}` ({token}) left its data incomplete: \
             {}/{fixed_size} fixed and {}/{dynamic_size} dynamic bytes written",
            function.name(),
            fixed.written(),
            dynamic.written()
        );
        let largest = fixed.largest_identifier().max(dynamic.largest_identifier());
        let (fixed, dynamic) = (fixed.into_bytes(), dynamic.into_bytes());
        let counted = function.dynamic_size(ByteReader::new(fixed));
        assert_eq!(
            counted,
            dynamic_size,
            "low-level function `{}` ({token}) counts {counted} dynamic bytes, {dynamic_size} were pushed; {}",
            function.name(),
            function.describe(ByteReader::new(fixed), ByteReader::new(dynamic))
        );
        self.streams.close_block(token, largest);
    }

    // ── Positions ──

    pub fn position(&self) -> Position {
        self.streams.position(self.indices.position())
    }

    pub fn zero_position(&self) -> Position {
        Position::default()
    }

    pub fn is_empty(&self) -> bool {
        self.position() == self.zero_position()
    }

    /// Whether `position` lies within this tape's recording.
    pub fn contains(&self, position: &Position) -> bool {
        self.streams.contains(position)
    }

    /// Drop the whole recording.
    ///
    /// The adjoint vector keeps its size; it is zeroed when
    /// [`TapeConfig::clear_adjoints_on_reset`] is set.
    pub fn reset(&mut self) {
        debug!(
            "resetting tape with {} statements",
            self.streams.statements.len()
        );
        self.streams.reset();
        self.indices.reset();
        if self.config.clear_adjoints_on_reset {
            self.adjoints.clear();
        }
    }

    /// Truncate the recording back to `position`.
    pub fn reset_to(&mut self, position: Position) {
        assert!(
            self.contains(&position),
            "cannot reset to {position:?}; tape ends at {:?}",
            self.position()
        );
        debug!(
            "resetting tape to statement {:?}, dropping {} statements",
            position.statements,
            self.streams
                .statements
                .distance(position.statements, self.streams.statements.position())
        );
        self.streams.reset_to(&position);
        self.indices.reset_to(position.index);
    }

    // ── Gradient access ──

    pub fn adjoint_vector_size(&self) -> usize {
        self.adjoints.len()
    }

    pub fn resize_adjoint_vector(&mut self, size: usize) {
        self.adjoints.resize(size);
    }

    /// Number of slots a replay over the whole tape needs.
    pub(crate) fn required_adjoint_size(&self) -> usize {
        self.indices.largest_index().max(self.streams.largest) as usize + 1
    }

    pub fn adjoints(&self) -> &A {
        &self.adjoints
    }

    pub fn adjoints_mut(&mut self) -> &mut A {
        &mut self.adjoints
    }

    /// Adjoint of `identifier` under the given bounds checking policy.
    pub fn get_gradient(&self, identifier: Identifier, checking: BoundsChecking) -> Result<F, Error> {
        if let Some(value) = self.adjoints.read(identifier as usize) {
            return Ok(value);
        }
        match checking {
            BoundsChecking::Relaxed => Ok(self.dummy_gradient(identifier)),
            BoundsChecking::Strict => Err(Error::OutOfBounds {
                identifier,
                size: self.adjoints.len(),
            }),
            BoundsChecking::Off => panic!(
                "identifier {identifier} is outside the adjoint vector (size {})",
                self.adjoints.len()
            ),
        }
    }

    /// Adjoint of `identifier` with relaxed bounds checking.
    pub fn gradient(&self, identifier: Identifier) -> F {
        match self.adjoints.read(identifier as usize) {
            Some(value) => value,
            None => self.dummy_gradient(identifier),
        }
    }

    fn dummy_gradient(&self, identifier: Identifier) -> F {
        debug!(
            "identifier {identifier} is outside the adjoint vector (size {}), reading slot 0",
            self.adjoints.len()
        );
        self.adjoints.read(0).unwrap_or_else(F::zero)
    }

    /// Overwrite the adjoint of `identifier`.
    pub fn set_gradient(
        &mut self,
        identifier: Identifier,
        value: F,
        checking: BoundsChecking,
    ) -> Result<(), Error> {
        let mut slot = self.gradient_mut(identifier, checking)?;
        *slot = value;
        Ok(())
    }

    /// Set the adjoint of `identifier`, growing the vector as needed. Passive
    /// identifiers are ignored.
    pub fn seed(&mut self, identifier: Identifier, value: F) {
        if identifier != PASSIVE {
            self.adjoints.ensure(identifier as usize);
            self.adjoints.begin_use()[identifier as usize] = value;
        }
    }

    /// Mutable access to the adjoint of `identifier`. The returned guard holds
    /// the adjoint vector in use.
    pub fn gradient_mut(
        &mut self,
        identifier: Identifier,
        checking: BoundsChecking,
    ) -> Result<GradientMut<'_, F, A>, Error> {
        let index = identifier as usize;
        match checking {
            BoundsChecking::Relaxed => self.adjoints.ensure(index),
            BoundsChecking::Strict => {
                if index >= self.adjoints.len() {
                    return Err(Error::OutOfBounds {
                        identifier,
                        size: self.adjoints.len(),
                    });
                }
            }
            BoundsChecking::Off => {}
        }
        Ok(GradientMut::new(self.adjoints.begin_use(), index))
    }

    /// Zero the whole adjoint vector.
    pub fn clear_adjoints_all(&mut self) {
        self.adjoints.clear();
    }

    // ── Statistics ──

    pub fn statistics(&self) -> TapeStatistics {
        let (mut inputs, mut statements, mut low_level_functions) = (0, 0, 0);
        self.streams.statements.evaluate_forward(
            ChunkPosition::ZERO,
            self.streams.statements.position(),
            |_, counts, cursor, bound| {
                for &raw in &counts[*cursor..bound] {
                    match StatementKind::decode(raw) {
                        StatementKind::Input => inputs += 1,
                        StatementKind::Normal { .. } => statements += 1,
                        StatementKind::LowLevelFunction => low_level_functions += 1,
                    }
                }
                *cursor = bound;
            },
        );

        let s = &self.streams;
        TapeStatistics {
            inputs,
            statements,
            low_level_functions,
            jacobians: s.jacobians.len(),
            fixed_bytes: s.fixed.len(),
            dynamic_bytes: s.dynamic.len(),
            statement_chunks: s.statements.chunk_count(),
            jacobian_chunks: s.jacobians.chunk_count(),
            byte_chunks: s.fixed.chunk_count() + s.dynamic.chunk_count(),
            used_bytes: s.statements.used_bytes()
                + s.jacobians.used_bytes()
                + s.tokens.used_bytes()
                + s.fixed.used_bytes()
                + s.dynamic.used_bytes(),
            allocated_bytes: s.statements.allocated_bytes()
                + s.jacobians.allocated_bytes()
                + s.tokens.allocated_bytes()
                + s.fixed.allocated_bytes()
                + s.dynamic.allocated_bytes(),
            adjoint_vector_size: self.adjoints.len(),
            indices: IndexStatistics::of(&self.indices),
        }
    }
}

/// Summary of a tape's recording and memory use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TapeStatistics {
    /// Input registrations.
    pub inputs: usize,
    /// Statements with Jacobian entries.
    pub statements: usize,
    pub low_level_functions: usize,
    pub jacobians: usize,
    pub fixed_bytes: usize,
    pub dynamic_bytes: usize,
    pub statement_chunks: usize,
    pub jacobian_chunks: usize,
    pub byte_chunks: usize,
    pub used_bytes: usize,
    pub allocated_bytes: usize,
    pub adjoint_vector_size: usize,
    pub indices: IndexStatistics,
}

impl fmt::Display for TapeStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "statements: {} ({} inputs, {} low-level functions)",
            self.statements, self.inputs, self.low_level_functions
        )?;
        writeln!(
            f,
            "jacobian entries: {}, block bytes: {} fixed + {} dynamic",
            self.jacobians, self.fixed_bytes, self.dynamic_bytes
        )?;
        writeln!(
            f,
            "chunks: {} statement, {} jacobian, {} byte",
            self.statement_chunks, self.jacobian_chunks, self.byte_chunks
        )?;
        writeln!(
            f,
            "memory: {} bytes used of {} allocated, adjoint vector {} slots",
            self.used_bytes, self.allocated_bytes, self.adjoint_vector_size
        )?;
        write!(f, "{}", self.indices)
    }
}
