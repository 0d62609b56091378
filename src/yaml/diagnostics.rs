//! YAML error diagnostics pointing at the offending line of a document

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// YAML syntax or shape error with source location
#[derive(Debug, Error, Diagnostic)]
#[error("Could not parse {filename}: {message}")]
#[diagnostic(code(dilute::yaml::syntax))]
pub struct YamlSyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    span: SourceSpan,

    #[help]
    help: Option<String>,

    filename: String,

    /// The underlying parser message
    message: String,
}

impl YamlSyntaxError {
    /// Build a diagnostic from a serde_yml error
    pub fn from_serde_error(err: &serde_yml::Error, source: &str, filename: &str) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));

        let offset = line_col_to_offset(source, line, column);
        let message = err.to_string();
        let help = suggest_fix(&message);

        Self {
            src: NamedSource::new(filename, source.to_string()),
            span: SourceSpan::from(offset..offset.saturating_add(1)),
            help,
            filename: filename.to_string(),
            message,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Convert a 1-based line/column pair to a byte offset, clamped to the source
fn line_col_to_offset(source: &str, line: usize, column: usize) -> usize {
    let mut line_start = 0;
    for (index, text) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            let within = text
                .char_indices()
                .nth(column.saturating_sub(1))
                .map(|(i, _)| i)
                .unwrap_or(text.len().saturating_sub(1));
            return line_start + within;
        }
        line_start += text.len();
    }
    source.len().saturating_sub(1)
}

/// Hints for the mistakes people make when hand-editing plan documents
fn suggest_fix(message: &str) -> Option<String> {
    let msg = message.to_lowercase();

    if msg.contains("tab") {
        return Some("Indent with spaces; YAML does not allow tabs.".to_string());
    }
    if msg.contains("missing field `kind`") || msg.contains("missing field `version`") {
        return Some(
            "Documents start with `kind:` and `version:` and keep the payload under `data:`."
                .to_string(),
        );
    }
    if msg.contains("missing field") {
        return Some("A required field is absent. Compare with `dilute curve defaults`.".to_string());
    }
    if msg.contains("unknown variant") {
        return Some("Check the spelling of enumerated values such as `normalize_solvent`.".to_string());
    }
    if msg.contains("invalid type") {
        return Some(
            "Concentrations and volumes are plain numbers in mol/L and liters (e.g. 2.5e-9)."
                .to_string(),
        );
    }
    if msg.contains("duplicate key") {
        return Some("Each key may appear only once per mapping.".to_string());
    }
    None
}
