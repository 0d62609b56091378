//! Curve solver
//!
//! Finds intermediate helper concentrations that let every point of a
//! dilution curve be reached with droplet-quantized transfers:
//!
//! - [`alias`] - hits one target from a ladder of available concentrations
//! - [`explorer`] - searches ladders, scoring each with the alias engine
//! - [`assembler`] - rebuilds the best ladder into a [`DilutionCurve`]

pub mod alias;
pub mod assembler;
pub mod explorer;
pub mod options;

pub use alias::{alias, DilutionTransfer};
pub use assembler::{assemble, solve, DilutionCurve, DilutionPoint};
pub use explorer::{search, SearchState};
pub use options::{CurveError, DilutionCurveOptions, Tier};
