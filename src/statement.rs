//! Statement encoding shared by the recorder and the replay engine.
//!
//! A statement is stored as `(target identifier, argument count)` in the
//! statement stream. The argument count doubles as a tag:
//!
//! - [`INPUT_TAG`] (0) registers an identifier without a computation. Replay
//!   skips it, but range clearing zeroes its slot like any other target.
//! - [`LOW_LEVEL_FUNCTION_TAG`] marks a low-level function block whose data
//!   lives in the token and byte streams instead of the Jacobian stream.
//! - Everything in between is the number of Jacobian entries that follow.

/// Handle naming one active variable's slot in the adjoint/tangent vector.
pub type Identifier = u32;

/// Identifier carried by passive values. Never generated by an index manager.
pub const PASSIVE: Identifier = 0;

/// Raw argument count as stored in the statement stream.
pub type ArgumentCount = u8;

/// Argument count of an input registration.
pub const INPUT_TAG: ArgumentCount = 0;

/// Argument count reserved for low-level function blocks.
pub const LOW_LEVEL_FUNCTION_TAG: ArgumentCount = ArgumentCount::MAX;

/// Largest number of active arguments a normal statement can carry.
pub const MAX_ARGUMENTS: usize = LOW_LEVEL_FUNCTION_TAG as usize - 1;

/// Decoded form of a statement's argument count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Registers the target identifier; no Jacobian entries.
    Input,
    /// Followed by `arguments` Jacobian entries.
    Normal { arguments: ArgumentCount },
    /// Followed by one token and the block's fixed and dynamic bytes.
    LowLevelFunction,
}

impl StatementKind {
    #[inline]
    pub fn decode(raw: ArgumentCount) -> Self {
        match raw {
            INPUT_TAG => StatementKind::Input,
            LOW_LEVEL_FUNCTION_TAG => StatementKind::LowLevelFunction,
            arguments => StatementKind::Normal { arguments },
        }
    }

    #[inline]
    pub fn encode(self) -> ArgumentCount {
        match self {
            StatementKind::Input => INPUT_TAG,
            StatementKind::Normal { arguments } => {
                debug_assert!(arguments != INPUT_TAG && arguments != LOW_LEVEL_FUNCTION_TAG);
                arguments
            }
            StatementKind::LowLevelFunction => LOW_LEVEL_FUNCTION_TAG,
        }
    }

    /// Build the kind for a normal statement, panicking when `count` does not
    /// fit between the tags.
    #[inline]
    pub fn normal(count: usize) -> Self {
        debug_assert!(count > 0, "a statement without arguments is not recorded");
        assert!(
            count <= MAX_ARGUMENTS,
            "statement has {count} active arguments; at most {MAX_ARGUMENTS} are supported"
        );
        StatementKind::Normal {
            arguments: count as ArgumentCount,
        }
    }
}
