//! Versioned document envelopes for everything read from or written to disk
//!
//! Every persisted file has the shape:
//!
//! ```yaml
//! kind: curve-options
//! version: 1
//! data:
//!   top_concentration: 1.0e-5
//! ```
//!
//! A reader checks `kind` and `version` before touching `data` and refuses
//! anything it was not written for.

use miette::Diagnostic;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::yaml::YamlSyntaxError;

/// A payload type that can live inside an envelope
pub trait Document: Serialize + DeserializeOwned {
    /// Kind tag written to the envelope (e.g. "curve")
    const KIND: &'static str;

    /// Current format version
    const VERSION: u32 = 1;
}

/// Errors reading or writing documents
#[derive(Debug, Error, Diagnostic)]
pub enum DocumentError {
    #[error("Expected a '{expected}' document but {path} declares kind '{found}'")]
    #[diagnostic(
        code(dilute::document::kind_mismatch),
        help("Pass the file to the command that matches its `kind:` tag.")
    )]
    KindMismatch {
        expected: &'static str,
        found: String,
        path: String,
    },

    #[error("Unsupported version {found} for '{kind}' document {path} (this build reads version {expected})")]
    #[diagnostic(code(dilute::document::version))]
    UnsupportedVersion {
        kind: &'static str,
        expected: u32,
        found: u32,
        path: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Yaml(#[from] YamlSyntaxError),

    #[error("Could not parse {path}: {message}")]
    #[diagnostic(code(dilute::document::json))]
    Json { path: String, message: String },

    #[error("Could not serialize '{kind}' document: {message}")]
    #[diagnostic(code(dilute::document::serialize))]
    Serialize { kind: &'static str, message: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(dilute::document::io))]
    Io(#[from] std::io::Error),
}

/// On-disk encoding, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Yaml,
    Json,
}

impl Encoding {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Encoding::Json,
            _ => Encoding::Yaml,
        }
    }
}

#[derive(Debug, Serialize)]
struct EnvelopeOut<'a, T> {
    kind: &'static str,
    version: u32,
    data: &'a T,
}

#[derive(Debug, Deserialize)]
struct EnvelopeHeader {
    kind: String,
    version: u32,
}

#[derive(Debug, Deserialize)]
struct EnvelopeIn<T> {
    data: T,
}

fn parse<D: DeserializeOwned>(source: &str, encoding: Encoding, name: &str) -> Result<D, DocumentError> {
    match encoding {
        Encoding::Yaml => serde_yml::from_str(source)
            .map_err(|e| YamlSyntaxError::from_serde_error(&e, source, name).into()),
        Encoding::Json => serde_json::from_str(source).map_err(|e| DocumentError::Json {
            path: name.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Read the `kind` tag of a document without committing to a payload type
pub fn peek_kind(source: &str, encoding: Encoding, name: &str) -> Result<String, DocumentError> {
    let header: EnvelopeHeader = parse(source, encoding, name)?;
    Ok(header.kind)
}

/// Parse a document from text, checking the envelope first
pub fn from_str<T: Document>(source: &str, encoding: Encoding, name: &str) -> Result<T, DocumentError> {
    let header: EnvelopeHeader = parse(source, encoding, name)?;

    if header.kind != T::KIND {
        return Err(DocumentError::KindMismatch {
            expected: T::KIND,
            found: header.kind,
            path: name.to_string(),
        });
    }
    if header.version != T::VERSION {
        return Err(DocumentError::UnsupportedVersion {
            kind: T::KIND,
            expected: T::VERSION,
            found: header.version,
            path: name.to_string(),
        });
    }

    let envelope: EnvelopeIn<T> = parse(source, encoding, name)?;
    Ok(envelope.data)
}

/// Serialize a document, envelope included
pub fn to_string<T: Document>(value: &T, encoding: Encoding) -> Result<String, DocumentError> {
    let envelope = EnvelopeOut {
        kind: T::KIND,
        version: T::VERSION,
        data: value,
    };
    match encoding {
        Encoding::Yaml => serde_yml::to_string(&envelope).map_err(|e| DocumentError::Serialize {
            kind: T::KIND,
            message: e.to_string(),
        }),
        Encoding::Json => {
            serde_json::to_string_pretty(&envelope).map_err(|e| DocumentError::Serialize {
                kind: T::KIND,
                message: e.to_string(),
            })
        }
    }
}

/// Load a document from disk
pub fn load<T: Document>(path: &Path) -> Result<T, DocumentError> {
    let source = std::fs::read_to_string(path)?;
    from_str(&source, Encoding::from_path(path), &path.display().to_string())
}

/// Write a document to disk
pub fn save<T: Document>(value: &T, path: &Path) -> Result<(), DocumentError> {
    let content = to_string(value, Encoding::from_path(path))?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Aliquot {
        volume: f64,
    }

    impl Document for Aliquot {
        const KIND: &'static str = "aliquot";
    }

    #[test]
    fn test_yaml_roundtrip_through_envelope() {
        let text = to_string(&Aliquot { volume: 2.5e-9 }, Encoding::Yaml).unwrap();
        assert!(text.contains("kind: aliquot"));
        assert!(text.contains("version: 1"));

        let parsed: Aliquot = from_str(&text, Encoding::Yaml, "aliquot.yaml").unwrap();
        assert_eq!(parsed, Aliquot { volume: 2.5e-9 });
    }

    #[test]
    fn test_kind_mismatch_fails_fast() {
        let text = "kind: curve\nversion: 1\ndata:\n  volume: 1.0\n";
        let err = from_str::<Aliquot>(text, Encoding::Yaml, "x.yaml").unwrap_err();
        assert!(matches!(err, DocumentError::KindMismatch { .. }));
    }

    #[test]
    fn test_version_mismatch_fails_fast() {
        let text = r#"{"kind": "aliquot", "version": 7, "data": {"volume": 1.0}}"#;
        let err = from_str::<Aliquot>(text, Encoding::Json, "x.json").unwrap_err();
        assert!(matches!(
            err,
            DocumentError::UnsupportedVersion { found: 7, .. }
        ));
    }

    #[test]
    fn test_missing_envelope_is_a_syntax_error() {
        let err = from_str::<Aliquot>("volume: 1.0\n", Encoding::Yaml, "bare.yaml").unwrap_err();
        assert!(matches!(err, DocumentError::Yaml(_)));
    }

    #[test]
    fn test_encoding_from_extension() {
        assert_eq!(Encoding::from_path(Path::new("a/b.json")), Encoding::Json);
        assert_eq!(Encoding::from_path(Path::new("a/b.yaml")), Encoding::Yaml);
        assert_eq!(Encoding::from_path(Path::new("noext")), Encoding::Yaml);
    }

    #[test]
    fn test_peek_kind() {
        let kind = peek_kind("kind: arp-request\nversion: 1\ndata: {}\n", Encoding::Yaml, "r.yaml").unwrap();
        assert_eq!(kind, "arp-request");
    }
}
