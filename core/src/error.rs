//! Error types for the Cloudant client.
//!
//! # Design
//! A non-2xx response always becomes `Http`. When the body was a CouchDB
//! error document the parsed `error`/`reason` pair rides along in
//! `Http::error`, so callers can tell "the service rejected this" apart from
//! a bare status failure. `NoDatabase` is raised before any request is built.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `{"error": ..., "reason": ...}` document returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationError {
    pub error: String,
    #[serde(default)]
    pub reason: String,
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.error)
        } else {
            write!(f, "{}: {}", self.error, self.reason)
        }
    }
}

/// Errors returned by `CloudantClient` parse methods and `Cloudant` operations.
#[derive(Debug, thiserror::Error)]
pub enum CloudantError {
    /// The operation needs a database and none was given or bound.
    #[error("no database name given and none bound to the client")]
    NoDatabase,

    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {}", http_detail(.error.as_ref(), .body))]
    Http {
        status: u16,
        error: Option<ApplicationError>,
        body: String,
    },

    /// No response was received.
    #[error("transport failed: {0}")]
    Transport(#[from] ureq::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// The response was well-formed JSON but lacked an expected field.
    #[error("response is missing `{0}`")]
    MissingField(&'static str),
}

impl CloudantError {
    /// The service's error document, if the failure carried one.
    pub fn application_error(&self) -> Option<&ApplicationError> {
        match self {
            CloudantError::Http { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CloudantError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// A stale or missing revision on update/delete.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

fn http_detail(error: Option<&ApplicationError>, body: &str) -> String {
    match error {
        Some(error) => error.to_string(),
        None => body.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, CloudantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_message_includes_reason() {
        let err = CloudantError::Http {
            status: 404,
            error: Some(ApplicationError {
                error: "not_found".to_string(),
                reason: "deleted".to_string(),
            }),
            body: r#"{"error":"not_found","reason":"deleted"}"#.to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404: not_found: deleted");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn http_error_without_document_shows_body() {
        let err = CloudantError::Http {
            status: 502,
            error: None,
            body: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 502: bad gateway");
        assert!(err.application_error().is_none());
    }

    #[test]
    fn precondition_failure_has_no_status() {
        let err = CloudantError::NoDatabase;
        assert_eq!(err.status(), None);
        assert!(err.application_error().is_none());
    }
}
