//! dilute: serial dilution planning for compound screening
//!
//! Solves droplet-quantized dilution curves for acoustic liquid handlers and
//! allocates them onto concrete stock, intermediate, and assay-ready plates.

pub mod cli;
pub mod core;
pub mod curve;
pub mod export;
pub mod production;
pub mod yaml;
