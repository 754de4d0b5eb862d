use serde::{Deserialize, Serialize};

/// One annotation stored in an annotation database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnnotationRecord {
    /// Address the annotation is attached to.
    pub address: u64,
    pub text: String,
    /// RFC 3339 timestamp of the first write.
    pub created_at: String,
}

impl AnnotationRecord {
    pub fn new(address: u64, text: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self { address, text: text.into(), created_at: created_at.into() }
    }
}
