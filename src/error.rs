//! Module containing the crate-wide error type
use thiserror::Error;

use crate::statement::Identifier;

/// Errors reported by gradient access and tape editing.
///
/// Faults that indicate a bug in the recorder (argument counts that do not
/// match the Jacobian stream, partially written low-level blocks) are not
/// represented here; they panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Strict bounds checking rejected an adjoint access
    #[error("identifier {identifier} is outside the adjoint vector (size {size})")]
    OutOfBounds { identifier: Identifier, size: usize },

    /// Range start lies after range end
    #[error("range start lies after range end")]
    ReversedRange,

    /// Position refers to data this tape does not hold
    #[error("position does not belong to this tape")]
    ForeignPosition,

    /// Low-level function token is not registered in the destination tape
    #[error("low-level function token {0} is not registered in the destination tape")]
    UnknownToken(u16),

    /// Low-level function token refers to different callbacks in two tapes
    #[error(
        "low-level function token {token} refers to `{source_name}` in the source \
         tape but `{destination_name}` in the destination tape"
    )]
    IncompatibleToken {
        token: u16,
        source_name: String,
        destination_name: String,
    },
}
