//! Error taxonomy for the detection engine.
//!
//! Only `HostDataUnavailable` and the catalog errors ever escape an analysis
//! run. Per-item problems (`MalformedReference`, `StringDecodeError`,
//! `AnnotationWriteFailure`) are recovered where they happen, logged with the
//! offending address and recorded as diagnostics; the variants exist so those
//! records and the logs share one vocabulary.

use thiserror::Error;

use crate::catalog::CatalogError;

/// Error reported by a host adapter while producing binary data.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The host could not provide its procedure or string table. Fatal.
    #[error("Host data unavailable from {host}: {reason}")]
    HostDataUnavailable { host: String, reason: String },

    /// A reference edge had no usable shape. Recoverable.
    #[error("Malformed reference at 0x{address:X}: {reason}")]
    MalformedReference { address: u64, reason: String },

    /// A string literal could not be decoded. Recoverable.
    #[error("String at 0x{address:X} could not be decoded: {reason}")]
    StringDecodeError { address: u64, reason: String },

    /// Loading or extending the signature catalog failed. Startup-fatal.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Writing an annotation back into the document failed. Recoverable.
    #[error("Annotation write failed at 0x{address:X}: {reason}")]
    AnnotationWriteFailure { address: u64, reason: String },

    /// A built-in literal pattern failed to compile.
    #[error("Invalid literal pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Unknown host '{name}'; available: {available}")]
    UnknownHost { name: String, available: String },
}

impl EngineError {
    pub fn host_unavailable(host: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        EngineError::HostDataUnavailable { host: host.into(), reason: reason.to_string() }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
