//! Construction-time tape configuration and access policies.

/// Sizes and policies chosen when a tape is built.
///
/// Chunk sizes are counted in items of the respective stream (statements,
/// Jacobian entries, tokens, bytes). A chunk is only ever larger than its
/// configured size when a single reservation exceeds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TapeConfig {
    pub statement_chunk_size: usize,
    pub jacobian_chunk_size: usize,
    pub token_chunk_size: usize,
    pub byte_chunk_size: usize,
    /// Number of adjoint slots allocated up front.
    pub initial_adjoint_size: usize,
    /// Zero the adjoint vector on [`reset`](crate::JacobianTape::reset).
    pub clear_adjoints_on_reset: bool,
}

impl Default for TapeConfig {
    fn default() -> Self {
        TapeConfig {
            statement_chunk_size: 1 << 16,
            jacobian_chunk_size: 1 << 17,
            token_chunk_size: 1 << 10,
            byte_chunk_size: 1 << 16,
            initial_adjoint_size: 0,
            clear_adjoints_on_reset: true,
        }
    }
}

impl TapeConfig {
    /// Use the same chunk size for every stream. Mostly useful in tests that
    /// want to exercise chunk boundaries with tiny recordings.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        assert!(size > 0, "chunk size must be positive");
        self.statement_chunk_size = size;
        self.jacobian_chunk_size = size;
        self.token_chunk_size = size;
        self.byte_chunk_size = size;
        self
    }

    pub fn with_statement_chunk_size(mut self, size: usize) -> Self {
        assert!(size > 0, "chunk size must be positive");
        self.statement_chunk_size = size;
        self
    }

    pub fn with_jacobian_chunk_size(mut self, size: usize) -> Self {
        assert!(size > 0, "chunk size must be positive");
        self.jacobian_chunk_size = size;
        self
    }

    pub fn with_token_chunk_size(mut self, size: usize) -> Self {
        assert!(size > 0, "chunk size must be positive");
        self.token_chunk_size = size;
        self
    }

    pub fn with_byte_chunk_size(mut self, size: usize) -> Self {
        assert!(size > 0, "chunk size must be positive");
        self.byte_chunk_size = size;
        self
    }

    pub fn with_initial_adjoint_size(mut self, size: usize) -> Self {
        self.initial_adjoint_size = size;
        self
    }

    pub fn with_clear_adjoints_on_reset(mut self, clear: bool) -> Self {
        self.clear_adjoints_on_reset = clear;
        self
    }
}

/// Bounds-checking policy for gradient access by identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoundsChecking {
    /// Writes grow the adjoint vector; out-of-range reads see the dummy slot 0.
    #[default]
    Relaxed,
    /// Out-of-range access is reported as [`Error::OutOfBounds`](crate::Error::OutOfBounds).
    Strict,
    /// No check at all. The caller has sized the vector with
    /// [`resize_adjoint_vector`](crate::JacobianTape::resize_adjoint_vector);
    /// an out-of-range identifier panics on indexing.
    Off,
}

/// Whether a replay may manage the adjoint vector on its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdjointsManagement {
    /// Grow the vector to cover every identifier before replaying.
    #[default]
    Automatic,
    /// Leave the vector as is; the caller guarantees its size.
    Manual,
}
