//! Forward and reverse replay, and range clearing.
//!
//! The statement stream drives every walk. The Jacobian, token and byte
//! streams are consumed through cursors in runs whose lengths come from the
//! statements (argument counts) and from the low-level callbacks (block
//! sizes). When a walk ends, every cursor must sit exactly at the range end.

use log::trace;

use super::{JacobianTape, Position, Streams};
use crate::adjoints::AdjointVector;
use crate::bytes::ByteReader;
use crate::config::AdjointsManagement;
use crate::float::Float;
use crate::index::IndexManager;
use crate::lowlevel::{Registry, VectorAccess};
use crate::statement::StatementKind;

impl<F: Float> Streams<F> {
    /// Tangent sweep over `[start, end)`.
    pub(crate) fn evaluate_forward(
        &self,
        registry: &Registry<F>,
        start: &Position,
        end: &Position,
        tangents: &mut [F],
    ) {
        let mut jacobians = self.jacobians.cursor(start.jacobians);
        let mut tokens = self.tokens.cursor(start.tokens);
        let mut fixed = self.fixed.cursor(start.fixed);
        let mut dynamic = self.dynamic.cursor(start.dynamic);

        self.statements.evaluate_forward(
            start.statements,
            end.statements,
            |targets, counts, cursor, bound| {
                while *cursor < bound {
                    match StatementKind::decode(counts[*cursor]) {
                        StatementKind::Input => {}
                        StatementKind::Normal { arguments } => {
                            let (partials, ids) = jacobians.take_forward(arguments as usize);
                            let mut tangent = F::zero();
                            for (&partial, &argument) in partials.iter().zip(ids) {
                                tangent = tangent + partial * tangents[argument as usize];
                            }
                            tangents[targets[*cursor] as usize] = tangent;
                        }
                        StatementKind::LowLevelFunction => {
                            let token = tokens.take_forward(1).0[0];
                            let function = registry.expect(token);
                            let fixed_bytes = fixed.take_forward(function.fixed_size()).0;
                            let size = function.dynamic_size(ByteReader::new(fixed_bytes));
                            let dynamic_bytes = dynamic.take_forward(size).0;
                            trace!("forward through low-level function `{}` ({token})", function.name());
                            function.forward(
                                ByteReader::new(fixed_bytes),
                                ByteReader::new(dynamic_bytes),
                                &mut VectorAccess::new(tangents),
                            );
                        }
                    }
                    *cursor += 1;
                }
            },
        );

        jacobians.finish(end.jacobians, "Jacobian");
        tokens.finish(end.tokens, "token");
        fixed.finish(end.fixed, "fixed byte");
        dynamic.finish(end.dynamic, "dynamic byte");
    }

    /// Adjoint sweep from `start` down to `end`.
    pub(crate) fn evaluate_reverse(
        &self,
        registry: &Registry<F>,
        start: &Position,
        end: &Position,
        adjoints: &mut [F],
    ) {
        let mut jacobians = self.jacobians.cursor(start.jacobians);
        let mut tokens = self.tokens.cursor(start.tokens);
        let mut fixed = self.fixed.cursor(start.fixed);
        let mut dynamic = self.dynamic.cursor(start.dynamic);

        self.statements.evaluate_reverse(
            start.statements,
            end.statements,
            |targets, counts, cursor, bound| {
                while *cursor > bound {
                    *cursor -= 1;
                    match StatementKind::decode(counts[*cursor]) {
                        StatementKind::Input => {}
                        StatementKind::Normal { arguments } => {
                            // The Jacobian cursor moves even when the adjoint is zero.
                            let (partials, ids) = jacobians.take_reverse(arguments as usize);
                            let target = targets[*cursor] as usize;
                            let adjoint = std::mem::replace(&mut adjoints[target], F::zero());
                            if adjoint != F::zero() {
                                for (&partial, &argument) in partials.iter().zip(ids) {
                                    let slot = &mut adjoints[argument as usize];
                                    *slot = *slot + partial * adjoint;
                                }
                            }
                        }
                        StatementKind::LowLevelFunction => {
                            let token = tokens.take_reverse(1).0[0];
                            let function = registry.expect(token);
                            let fixed_bytes = fixed.take_reverse(function.fixed_size()).0;
                            let size = function.dynamic_size(ByteReader::new(fixed_bytes));
                            let dynamic_bytes = dynamic.take_reverse(size).0;
                            trace!("reverse through low-level function `{}` ({token})", function.name());
                            function.reverse(
                                ByteReader::new(fixed_bytes),
                                ByteReader::new(dynamic_bytes),
                                &mut VectorAccess::new(adjoints),
                            );
                        }
                    }
                }
            },
        );

        jacobians.finish(end.jacobians, "Jacobian");
        tokens.finish(end.tokens, "token");
        fixed.finish(end.fixed, "fixed byte");
        dynamic.finish(end.dynamic, "dynamic byte");
    }

    /// Zero the target slot of every statement between the two positions.
    /// Only the statement stream is read.
    pub(crate) fn clear_targets(&self, start: &Position, end: &Position, adjoints: &mut [F]) {
        self.statements.evaluate_reverse(
            start.statements,
            end.statements,
            |targets, _, cursor, bound| {
                for &target in &targets[bound..*cursor] {
                    if let Some(slot) = adjoints.get_mut(target as usize) {
                        *slot = F::zero();
                    }
                }
                *cursor = bound;
            },
        );
    }
}

impl<F: Float, I: IndexManager, A: AdjointVector<F>> JacobianTape<F, I, A> {
    fn prepare(&mut self, management: AdjointsManagement) {
        if management == AdjointsManagement::Automatic {
            let largest = self.required_adjoint_size() - 1;
            self.adjoints.ensure(largest);
        }
    }

    /// Propagate tangents over `[start, end)` using the tape's adjoint vector
    /// as tangent storage. Each target's tangent is overwritten.
    pub fn evaluate_forward(&mut self, start: Position, end: Position) {
        self.evaluate_forward_managed(start, end, AdjointsManagement::Automatic);
    }

    pub fn evaluate_forward_managed(
        &mut self,
        start: Position,
        end: Position,
        management: AdjointsManagement,
    ) {
        assert!(start <= end, "forward range {start:?}..{end:?} is reversed");
        self.prepare(management);
        let mut vector = self.adjoints.begin_use();
        self.streams
            .evaluate_forward(&self.registry, &start, &end, &mut vector[..]);
    }

    /// Propagate tangents over `[start, end)` into a caller vector, which
    /// must cover every identifier in range.
    pub fn evaluate_forward_with(&self, start: Position, end: Position, tangents: &mut [F]) {
        assert!(start <= end, "forward range {start:?}..{end:?} is reversed");
        self.streams
            .evaluate_forward(&self.registry, &start, &end, tangents);
    }

    /// Propagate adjoints from `start` back to `end` (`end <= start`).
    ///
    /// Each statement's target adjoint is distributed to its arguments and
    /// then zeroed.
    pub fn evaluate_reverse(&mut self, start: Position, end: Position) {
        self.evaluate_reverse_managed(start, end, AdjointsManagement::Automatic);
    }

    pub fn evaluate_reverse_managed(
        &mut self,
        start: Position,
        end: Position,
        management: AdjointsManagement,
    ) {
        assert!(end <= start, "reverse range {start:?}..{end:?} is reversed");
        self.prepare(management);
        let mut vector = self.adjoints.begin_use();
        self.streams
            .evaluate_reverse(&self.registry, &start, &end, &mut vector[..]);
    }

    /// Propagate adjoints from `start` back to `end` in a caller vector.
    pub fn evaluate_reverse_with(&self, start: Position, end: Position, adjoints: &mut [F]) {
        assert!(end <= start, "reverse range {start:?}..{end:?} is reversed");
        self.streams
            .evaluate_reverse(&self.registry, &start, &end, adjoints);
    }

    /// Zero the adjoints of every target recorded between `start` and `end`,
    /// in either order.
    ///
    /// Under a linear index manager those targets are the contiguous block
    /// of identifiers issued between the two positions, which is cleared as
    /// a slice. With reused identifiers they are scattered over the vector,
    /// so the statements are walked instead. Under
    /// [`AdjointsManagement::Automatic`] the vector is first grown to cover
    /// the tape; otherwise targets outside it are skipped.
    pub fn clear_adjoints(&mut self, start: Position, end: Position, management: AdjointsManagement) {
        let (start, end) = if end <= start { (start, end) } else { (end, start) };
        self.prepare(management);
        let mut vector = self.adjoints.begin_use();
        if I::IS_LINEAR {
            let len = vector.len();
            let first = (end.index as usize + 1).min(len);
            let last = (start.index as usize + 1).min(len);
            vector[first..last].fill(F::zero());
        } else {
            self.streams.clear_targets(&start, &end, &mut vector[..]);
        }
    }

    /// Reverse sweep over the whole tape.
    pub fn evaluate(&mut self) {
        let end = self.position();
        self.evaluate_reverse(end, self.zero_position());
    }

    /// Forward sweep over the whole tape.
    pub fn evaluate_forward_all(&mut self) {
        let end = self.position();
        self.evaluate_forward(self.zero_position(), end);
    }
}
