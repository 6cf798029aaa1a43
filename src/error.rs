//! Failures reported by external collaborators.
//!
//! Every collaborator call is fallible I/O. The service never retries; it
//! surfaces these as `ServiceError::System` and lets the caller decide.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{service} unreachable: {reason}")]
    Unreachable { service: &'static str, reason: String },

    #[error("{service} rejected request: {reason}")]
    Rejected { service: &'static str, reason: String },

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },
}

impl CollaboratorError {
    pub fn unreachable(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            service,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            what: "json payload",
            reason: err.to_string(),
        }
    }
}
