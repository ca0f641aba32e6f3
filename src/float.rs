use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FromPrimitive};

/// Marker trait for the primal and gradient types recorded on a tape (`f32`, `f64`).
///
/// Bundles the numeric and utility traits the tape needs to store partials
/// and propagate adjoints. Only primitive float types implement this.
pub trait Float:
    NumFloat + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
}

impl Float for f32 {}
impl Float for f64 {}
