//! Command implementations

pub mod completions;
pub mod config;
pub mod curve;
pub mod produce;
pub mod validate;
