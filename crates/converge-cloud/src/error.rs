//! Reconciliation error types

use crate::action::Identity;
use std::time::Duration;
use thiserror::Error;

/// What went wrong, independent of where
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ErrorKind {
    #[error("schema mismatch on `{attribute}`: {reason}")]
    SchemaMismatch { attribute: String, reason: String },

    #[error("incomplete dependent attributes {attributes:?}: missing {missing:?}")]
    IncompleteDependentAttributes {
        attributes: Vec<String>,
        missing: Vec<String>,
    },

    #[error("invalid value for `{attribute}`: {reason}")]
    InvalidValue { attribute: String, reason: String },

    #[error("`{attribute}` cannot change in place; the resource must be replaced")]
    RequiresReplacement { attribute: String },

    #[error("remote rejected the call{}: {message}", field_suffix(.field))]
    RemoteRejected {
        field: Option<String>,
        message: String,
    },

    #[error("resource not observable after write")]
    NotFoundAfterWrite,

    #[error("backend transition did not complete within {waited:?}")]
    PollTimeout { waited: Duration },

    #[error("transient transport failure: {0}")]
    TransientTransport(String),

    #[error("cancelled")]
    Cancelled,
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|f| format!(" for `{}`", f))
        .unwrap_or_default()
}

impl ErrorKind {
    /// Failures detected before any remote call was issued
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ErrorKind::SchemaMismatch { .. }
                | ErrorKind::IncompleteDependentAttributes { .. }
                | ErrorKind::InvalidValue { .. }
                | ErrorKind::RequiresReplacement { .. }
        )
    }
}

/// Error returned by the four reconciler operations.
///
/// Always names the operation that failed and, once assigned, the identity
/// of the resource so the caller can retry against the same instance.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{operation} on {kind_name} [{}]: {kind}", identity_label(.identity))]
pub struct ReconcileError {
    pub kind_name: &'static str,
    pub operation: String,
    pub identity: Option<Identity>,
    pub kind: ErrorKind,
}

fn identity_label(identity: &Option<Identity>) -> String {
    identity
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unassigned".to_string())
}

impl ReconcileError {
    pub fn new(
        kind_name: &'static str,
        operation: impl Into<String>,
        identity: Option<Identity>,
        kind: ErrorKind,
    ) -> Self {
        Self {
            kind_name,
            operation: operation.into(),
            identity,
            kind,
        }
    }

    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::NotFoundAfterWrite
                | ErrorKind::PollTimeout { .. }
                | ErrorKind::TransientTransport(_)
                | ErrorKind::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors reported by a remote resource client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    /// Request could not be built from the declared attributes
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

/// Classification used by the poller to decide whether to retry
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for ClientError {
    fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Server { .. })
    }
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Map a failed mutating call onto the reconciler's error kinds
    pub fn into_kind(self, field: Option<&str>) -> ErrorKind {
        match self {
            ClientError::Transport(message) => ErrorKind::TransientTransport(message),
            ClientError::Server { status, message } => {
                ErrorKind::TransientTransport(format!("{}: {}", status, message))
            }
            ClientError::Invalid { field, reason } => ErrorKind::InvalidValue {
                attribute: field,
                reason,
            },
            other => ErrorKind::RemoteRejected {
                field: field.map(str::to_string),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_operation_and_identity() {
        let err = ReconcileError::new(
            "project",
            "update(flavors)",
            Some(Identity::from("1001")),
            ErrorKind::RemoteRejected {
                field: Some("flavors".into()),
                message: "conflict".into(),
            },
        );
        let text = err.to_string();
        assert!(text.contains("update(flavors)"));
        assert!(text.contains("1001"));
        assert!(text.contains("`flavors`"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unassigned_identity_label() {
        let err = ReconcileError::new("project", "create", None, ErrorKind::Cancelled);
        assert!(err.to_string().contains("[unassigned]"));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(ClientError::Transport("reset".into()).is_transient());
        assert!(
            ClientError::Server {
                status: 503,
                message: "busy".into()
            }
            .is_transient()
        );
        assert!(!ClientError::NotFound("x".into()).is_transient());
        assert!(matches!(
            ClientError::Rejected {
                status: 400,
                message: "bad".into()
            }
            .into_kind(Some("name")),
            ErrorKind::RemoteRejected { .. }
        ));
    }
}
