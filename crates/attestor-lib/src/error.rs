//! Attestation error taxonomy
//!
//! Every step of the attestation pipeline fails with an [`AttestationError`].
//! Errors carry a [`Severity`] so callers can tell "caller is not a managed
//! workload" apart from "node infrastructure is broken".

use crate::models::ContainerRecord;
use std::time::Duration;
use thiserror::Error;

/// Maximum number of response body bytes kept on a bad directory status
pub const BODY_PREFIX_LIMIT: usize = 1024;

/// Result alias used across the attestation pipeline
pub type Result<T> = std::result::Result<T, AttestationError>;

/// Discriminant of an [`AttestationError`], used for metrics labels and
/// status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TransportQueryFailed,
    UnsupportedDirection,
    NotAPipeConnection,
    RuntimeUnavailable,
    ContainerNotFound,
    AmbiguousContainer,
    DirectoryUnreachable,
    DirectoryBadStatus,
    DirectoryDecodeFailed,
    WorkloadNotFound,
    Timeout,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransportQueryFailed => "transport_query_failed",
            ErrorKind::UnsupportedDirection => "unsupported_direction",
            ErrorKind::NotAPipeConnection => "not_a_pipe_connection",
            ErrorKind::RuntimeUnavailable => "runtime_unavailable",
            ErrorKind::ContainerNotFound => "container_not_found",
            ErrorKind::AmbiguousContainer => "ambiguous_container",
            ErrorKind::DirectoryUnreachable => "directory_unreachable",
            ErrorKind::DirectoryBadStatus => "directory_bad_status",
            ErrorKind::DirectoryDecodeFailed => "directory_decode_failed",
            ErrorKind::WorkloadNotFound => "workload_not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Configuration => "configuration",
        }
    }
}

/// How loudly a failure should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The caller is not a managed workload; frequent and benign
    Expected,
    /// The connection or request itself was refused
    Rejected,
    /// A node-local dependency is broken; candidate for alerting
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("peer process id query failed (os error {code:?}): {message}")]
    TransportQueryFailed { code: Option<i32>, message: String },

    #[error("outbound handshakes are not supported by process attestation credentials")]
    UnsupportedDirection,

    #[error("connection does not expose a local channel handle")]
    NotAPipeConnection,

    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("no container reports process id {pid}")]
    ContainerNotFound { pid: u32 },

    #[error("{} containers report process id {pid}", candidates.len())]
    AmbiguousContainer {
        pid: u32,
        candidates: Vec<ContainerRecord>,
    },

    #[error("workload directory unreachable: {0}")]
    DirectoryUnreachable(String),

    #[error("unexpected status code on pods response: {status} {body}")]
    DirectoryBadStatus { status: u16, body: String },

    #[error("unable to decode workload directory response: {0}")]
    DirectoryDecodeFailed(String),

    #[error("no workload owns container {container_id}")]
    WorkloadNotFound { container_id: String },

    #[error("attestation did not complete within {0:?}")]
    Timeout(Duration),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl AttestationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttestationError::TransportQueryFailed { .. } => ErrorKind::TransportQueryFailed,
            AttestationError::UnsupportedDirection => ErrorKind::UnsupportedDirection,
            AttestationError::NotAPipeConnection => ErrorKind::NotAPipeConnection,
            AttestationError::RuntimeUnavailable(_) => ErrorKind::RuntimeUnavailable,
            AttestationError::ContainerNotFound { .. } => ErrorKind::ContainerNotFound,
            AttestationError::AmbiguousContainer { .. } => ErrorKind::AmbiguousContainer,
            AttestationError::DirectoryUnreachable(_) => ErrorKind::DirectoryUnreachable,
            AttestationError::DirectoryBadStatus { .. } => ErrorKind::DirectoryBadStatus,
            AttestationError::DirectoryDecodeFailed(_) => ErrorKind::DirectoryDecodeFailed,
            AttestationError::WorkloadNotFound { .. } => ErrorKind::WorkloadNotFound,
            AttestationError::Timeout(_) => ErrorKind::Timeout,
            AttestationError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.kind() {
            ErrorKind::ContainerNotFound | ErrorKind::WorkloadNotFound => Severity::Expected,
            ErrorKind::RuntimeUnavailable
            | ErrorKind::DirectoryUnreachable
            | ErrorKind::DirectoryBadStatus
            | ErrorKind::DirectoryDecodeFailed
            | ErrorKind::Timeout => Severity::Infrastructure,
            ErrorKind::TransportQueryFailed
            | ErrorKind::UnsupportedDirection
            | ErrorKind::NotAPipeConnection
            | ErrorKind::AmbiguousContainer
            | ErrorKind::Configuration => Severity::Rejected,
        }
    }

    /// Build a bad-status error, keeping at most [`BODY_PREFIX_LIMIT`] bytes
    /// of the body
    pub fn bad_status(status: u16, body: &[u8]) -> Self {
        let prefix = &body[..body.len().min(BODY_PREFIX_LIMIT)];
        AttestationError::DirectoryBadStatus {
            status,
            body: String::from_utf8_lossy(prefix).into_owned(),
        }
    }
}

impl From<AttestationError> for tonic::Status {
    fn from(err: AttestationError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Timeout => tonic::Status::deadline_exceeded(message),
            _ => match err.severity() {
                Severity::Expected => tonic::Status::permission_denied(message),
                Severity::Infrastructure => tonic::Status::unavailable(message),
                Severity::Rejected => tonic::Status::internal(message),
            },
        }
    }
}
