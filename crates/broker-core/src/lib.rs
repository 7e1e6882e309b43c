pub mod config;
pub mod document;
pub mod types;

pub use config::{BrokerdConfig, Environment};
pub use document::{DocumentError, DocumentSource, EMBEDDED_DOCUMENT, embedded_document};
pub use types::*;
