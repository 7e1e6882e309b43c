//! Bootstrap behavior document sources.
//!
//! The broker starts from a JSON document of the shape
//! `{max_fetch_service_instance_requests, behaviors, service_instances}`.
//! It is either the document compiled into this crate or a file on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The default behavior document shipped with the broker.
pub const EMBEDDED_DOCUMENT: &str = include_str!("../assets/data.json");

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum DocumentSource {
    /// The compiled-in default: `embedded:` (or an empty string).
    #[default]
    Embedded,
    /// Local file: file:///path/to/data.json or ./relative/data.json
    File { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read behavior document {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid behavior document {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("behavior document {0} must be a JSON object")]
    NotAnObject(String),
}

impl DocumentSource {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == "embedded:" {
            DocumentSource::Embedded
        } else if let Some(path) = raw.strip_prefix("file://") {
            DocumentSource::File { path: PathBuf::from(path) }
        } else {
            DocumentSource::File { path: PathBuf::from(raw) }
        }
    }

    pub fn from_path(path: &Path) -> Self {
        DocumentSource::File { path: path.to_path_buf() }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            DocumentSource::Embedded => "embedded",
            DocumentSource::File { .. } => "file",
        }
    }

    /// Human-readable origin used in logs and errors.
    pub fn origin(&self) -> String {
        match self {
            DocumentSource::Embedded => "embedded:".to_string(),
            DocumentSource::File { path } => path.display().to_string(),
        }
    }

    /// Read and parse the document. Only objects are accepted.
    pub fn load(&self) -> Result<serde_json::Value, DocumentError> {
        let content = match self {
            DocumentSource::Embedded => EMBEDDED_DOCUMENT.to_string(),
            DocumentSource::File { path } => {
                std::fs::read_to_string(path).map_err(|source| DocumentError::Read {
                    path: path.clone(),
                    source,
                })?
            }
        };
        parse_document(&content, &self.origin())
    }
}

fn parse_document(content: &str, origin: &str) -> Result<serde_json::Value, DocumentError> {
    let value: serde_json::Value =
        serde_json::from_str(content).map_err(|source| DocumentError::Parse {
            origin: origin.to_string(),
            source,
        })?;
    if !value.is_object() {
        return Err(DocumentError::NotAnObject(origin.to_string()));
    }
    Ok(value)
}

/// The embedded default document, parsed.
pub fn embedded_document() -> serde_json::Value {
    // The embedded asset is validated by the tests below.
    DocumentSource::Embedded
        .load()
        .unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_embedded() {
        assert_eq!(DocumentSource::parse(""), DocumentSource::Embedded);
        assert_eq!(DocumentSource::parse("embedded:").scheme(), "embedded");
    }

    #[test]
    fn test_parse_file_uri() {
        let source = DocumentSource::parse("file:///etc/broker/data.json");
        assert_eq!(
            source,
            DocumentSource::File { path: PathBuf::from("/etc/broker/data.json") }
        );
    }

    #[test]
    fn test_parse_local_relative() {
        let source = DocumentSource::parse("./data.json");
        assert_eq!(source.scheme(), "file");
    }

    #[test]
    fn test_embedded_document_is_complete() {
        let doc = DocumentSource::Embedded.load().unwrap();
        assert_eq!(doc["max_fetch_service_instance_requests"], 1);
        let behaviors = doc["behaviors"].as_object().unwrap();
        for op in crate::OperationType::ALL {
            assert!(behaviors.contains_key(op.as_str()), "missing {op}");
        }
        assert!(doc["service_instances"].as_object().unwrap().is_empty());
        assert_eq!(embedded_document(), doc);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"behaviors": {{}}, "service_instances": {{}}}}"#).unwrap();

        let doc = DocumentSource::from_path(file.path()).load().unwrap();
        assert!(doc["behaviors"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_load_rejects_non_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();

        let err = DocumentSource::from_path(file.path()).load().unwrap_err();
        assert!(matches!(err, DocumentError::NotAnObject(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = DocumentSource::parse("/definitely/not/here.json")
            .load()
            .unwrap_err();
        assert!(matches!(err, DocumentError::Read { .. }));
    }
}
