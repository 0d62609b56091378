//! Export - CSV files for the liquid handler and for plate records

pub mod picklist;
pub mod platemap;

use miette::Diagnostic;
use thiserror::Error;

pub use picklist::{picklist_rows, write_picklist, PicklistRow};
pub use platemap::{platemap_rows, write_platemap, PlatemapRow};

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error("Failed to write CSV: {0}")]
    #[diagnostic(code(dilute::export::csv))]
    Csv(#[from] csv::Error),

    #[error("Failed to write output: {0}")]
    #[diagnostic(code(dilute::export::io))]
    Io(#[from] std::io::Error),

    #[error("CSV output was not valid UTF-8")]
    #[diagnostic(code(dilute::export::utf8))]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Run a CSV writer into memory and return the text
pub(crate) fn to_string<F>(write: F) -> Result<String, ExportError>
where
    F: FnOnce(&mut Vec<u8>) -> Result<(), ExportError>,
{
    let mut buffer = Vec::new();
    write(&mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
