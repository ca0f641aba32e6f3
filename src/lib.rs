//! Jacobian tapes for reverse- and forward-mode automatic differentiation.
//!
//! A [`JacobianTape`] records every elementary statement on active variables
//! as a target identifier plus `(partial, argument)` pairs, and replays the
//! recording to propagate adjoints (reverse mode) or tangents (forward mode).
//! Recorded ranges can be cleared, erased and appended to other tapes.
//!
//! The identifier scheme and the adjoint vector storage are type parameters;
//! see [`ReuseTape`] and [`LinearTape`] for the common configurations.

pub mod active;
pub mod adjoints;
pub mod bytes;
pub mod chunked;
pub mod config;
pub mod error;
pub mod float;
pub mod index;
pub mod lowlevel;
pub mod operation;
pub mod statement;
pub mod tape;

pub use active::Active;
pub use adjoints::{AdjointVector, GradientMut, LocalAdjoints, SharedAdjoints};
pub use config::{AdjointsManagement, BoundsChecking, TapeConfig};
pub use error::Error;
pub use float::Float;
pub use index::{IndexManager, LinearIndexManager, ReuseIndexManager, ReuseScheme};
pub use lowlevel::{LowLevelFunction, LowLevelFunctionToken};
pub use operation::Operation;
pub use statement::{Identifier, PASSIVE};
pub use tape::{JacobianTape, LinearTape, Position, ReuseTape, TapeStatistics};

/// Reuse tape over `f64`.
pub type Tape64 = ReuseTape<f64>;
/// Reuse tape over `f32`.
pub type Tape32 = ReuseTape<f32>;
