//! Range editing: append a range of one tape to another, erase a range.
//!
//! Both operations only exist for tapes that reuse identifiers. An erase is
//! never done in place: the tail after the range is copied to a scratch
//! tape, the tape is truncated to the start of the range and the tail is
//! copied back.

use std::collections::BTreeSet;

use log::debug;

use super::{JacobianTape, Position, Streams};
use crate::adjoints::{AdjointVector, LocalAdjoints};
use crate::bytes::ByteReader;
use crate::error::Error;
use crate::float::Float;
use crate::index::ReuseScheme;
use crate::lowlevel::{LowLevelFunctionToken, Registry};
use crate::statement::StatementKind;

impl<F: Float> Streams<F> {
    /// Copy the statements of `source` between `start` and `end` to the end
    /// of this recording. Returns the number of statements copied.
    ///
    /// Identifiers are copied verbatim. Low-level blocks are sized through
    /// their callback and copied byte for byte, together with the largest
    /// identifier recorded for them.
    fn append_from(
        &mut self,
        source: &Streams<F>,
        registry: &Registry<F>,
        start: &Position,
        end: &Position,
    ) -> usize {
        let mut jacobians = source.jacobians.cursor(start.jacobians);
        let mut tokens = source.tokens.cursor(start.tokens);
        let mut fixed = source.fixed.cursor(start.fixed);
        let mut dynamic = source.dynamic.cursor(start.dynamic);
        let mut copied = 0;

        source.statements.evaluate_forward(
            start.statements,
            end.statements,
            |targets, counts, cursor, bound| {
                while *cursor < bound {
                    let target = targets[*cursor];
                    let kind = StatementKind::decode(counts[*cursor]);
                    match kind {
                        StatementKind::Input => {
                            self.statements.reserve(1);
                            self.push_statement(target, kind);
                        }
                        StatementKind::Normal { arguments } => {
                            let (partials, ids) = jacobians.take_forward(arguments as usize);
                            self.statements.reserve(1);
                            self.jacobians.reserve(partials.len());
                            for (&partial, &argument) in partials.iter().zip(ids) {
                                self.push_jacobian(partial, argument);
                            }
                            self.push_statement(target, kind);
                        }
                        StatementKind::LowLevelFunction => {
                            let (token, largest) = tokens.take_forward(1);
                            let (token, largest) = (token[0], largest[0]);
                            let function = registry.expect(token);
                            let fixed_bytes = fixed.take_forward(function.fixed_size()).0;
                            let size = function.dynamic_size(ByteReader::new(fixed_bytes));
                            let dynamic_bytes = dynamic.take_forward(size).0;

                            let (mut fixed_out, mut dynamic_out) =
                                self.push_block(fixed_bytes.len(), dynamic_bytes.len());
                            fixed_out.write_bytes(fixed_bytes);
                            dynamic_out.write_bytes(dynamic_bytes);
                            self.close_block(token, largest);
                        }
                    }
                    copied += 1;
                    *cursor += 1;
                }
            },
        );

        jacobians.finish(end.jacobians, "Jacobian");
        tokens.finish(end.tokens, "token");
        fixed.finish(end.fixed, "fixed byte");
        dynamic.finish(end.dynamic, "dynamic byte");
        copied
    }

    /// Distinct low-level tokens recorded between two positions.
    fn tokens_between(&self, start: &Position, end: &Position) -> BTreeSet<LowLevelFunctionToken> {
        let mut seen = BTreeSet::new();
        self.tokens
            .evaluate_forward(start.tokens, end.tokens, |tokens, _, cursor, bound| {
                seen.extend(tokens[*cursor..bound].iter().copied());
                *cursor = bound;
            });
        seen
    }
}

impl<F: Float, I: ReuseScheme, A: AdjointVector<F>> JacobianTape<F, I, A> {
    /// Check that `[start, end)` of `source` can be appended to this tape.
    fn check_append<B: AdjointVector<F>>(
        &self,
        source: &JacobianTape<F, I, B>,
        start: &Position,
        end: &Position,
    ) -> Result<(), Error> {
        if start > end {
            return Err(Error::ReversedRange);
        }
        if !source.contains(start) || !source.contains(end) {
            return Err(Error::ForeignPosition);
        }
        for token in source.streams.tokens_between(start, end) {
            let theirs = source.registry.expect(token);
            let Some(ours) = self.registry.get(token) else {
                return Err(Error::UnknownToken(token.raw()));
            };
            let same = std::ptr::eq(
                ours.as_ref() as *const _ as *const (),
                theirs as *const _ as *const (),
            );
            if !same {
                return Err(Error::IncompatibleToken {
                    token: token.raw(),
                    source_name: theirs.name().to_owned(),
                    destination_name: ours.name().to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Copy the statements of `source` between `start` and `end` to the end
    /// of this tape.
    ///
    /// Every low-level function token in the range must name the same
    /// callback object in both tapes (register the same `Arc` in each). On
    /// error neither tape is modified.
    ///
    /// Identifiers are copied verbatim, so the range must only refer to
    /// identifiers that mean the same variables in this tape; the index
    /// manager of this tape is not told about them.
    pub fn append<B: AdjointVector<F>>(
        &mut self,
        source: &JacobianTape<F, I, B>,
        start: Position,
        end: Position,
    ) -> Result<(), Error> {
        self.check_append(source, &start, &end)?;
        let copied = self
            .streams
            .append_from(&source.streams, &source.registry, &start, &end);
        debug!("appended {copied} statements");
        Ok(())
    }

    /// Remove the statements between `start` and `end`.
    ///
    /// Positions at or before `start` stay valid; later ones do not.
    pub fn erase(&mut self, start: Position, end: Position) -> Result<(), Error> {
        let mut scratch: JacobianTape<F, I, LocalAdjoints<F>> =
            JacobianTape::with_config(self.config);
        scratch.registry = self.registry.clone();
        self.erase_with(start, end, &mut scratch)
    }

    /// [`erase`](Self::erase) using a caller-provided scratch tape, which
    /// avoids allocating one per call.
    ///
    /// The scratch tape is left as it was found. Its registry must hold the
    /// same callbacks as this tape's for every token recorded after `end`.
    pub fn erase_with<B: AdjointVector<F>>(
        &mut self,
        start: Position,
        end: Position,
        scratch: &mut JacobianTape<F, I, B>,
    ) -> Result<(), Error> {
        if start > end {
            return Err(Error::ReversedRange);
        }
        if !self.contains(&start) {
            return Err(Error::ForeignPosition);
        }

        let tail_end = self.position();
        let scratch_start = scratch.position();
        scratch.append(self, end, tail_end)?;

        debug!(
            "erasing {} statements",
            self.streams
                .statements
                .distance(start.statements, end.statements)
        );
        self.reset_to(start);
        let scratch_end = scratch.position();
        let result = self.append(scratch, scratch_start, scratch_end);
        scratch.reset_to(scratch_start);
        result
    }
}
