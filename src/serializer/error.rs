//! Error types for document (de)serialization

use thiserror::Error;

/// Errors reading a wire document
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("{kind} '{id}' has no attributes")]
    MissingAttributes { kind: String, id: String },

    #[error("unknown resource type '{kind}' for '{id}'")]
    UnknownResourceType { kind: String, id: String },

    /// A relationship points at a resource that is not included
    #[error("relationship points at missing {kind} '{id}'")]
    DanglingRelationship { kind: String, id: String },

    #[error("invalid attributes on {kind} '{id}': {message}")]
    InvalidAttribute {
        kind: String,
        id: String,
        message: String,
    },

    #[error("invalid relationship '{name}' on {kind} '{id}': {reason}")]
    InvalidRelationship {
        kind: String,
        id: String,
        name: String,
        reason: String,
    },

    /// Compiled metadata that (indirectly) relates to itself
    #[error("compiled-metas '{id}' relates to itself")]
    CyclicRelationship { id: String },

    #[error("invalid document JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl SerializeError {
    pub(crate) fn missing_attributes(kind: &str, id: &str) -> Self {
        Self::MissingAttributes {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid_attribute(kind: &str, id: &str, message: impl ToString) -> Self {
        Self::InvalidAttribute {
            kind: kind.to_string(),
            id: id.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn invalid_relationship(kind: &str, id: &str, name: &str, reason: &str) -> Self {
        Self::InvalidRelationship {
            kind: kind.to_string(),
            id: id.to_string(),
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}
