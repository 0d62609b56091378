//! Core module - fundamental types and utilities

pub mod config;
pub mod document;
pub mod numeric;
pub mod report;

pub use config::Config;
pub use document::{Document, DocumentError, Encoding};
pub use report::Report;
