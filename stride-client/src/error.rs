//! Client error taxonomy.

use stride_common::{MemberKey, Operation};
use thiserror::Error;

pub type StrideResult<T> = Result<T, StrideError>;

/// One operation that did not go through during an apply phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedOperation {
    pub operation: Operation,
    pub reason: String,
    /// The backend error was transient; a fresh pass may succeed.
    pub retryable: bool,
}

impl FailedOperation {
    pub fn from_error(operation: Operation, error: &StrideError) -> Self {
        Self {
            operation,
            reason: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    pub fn member(&self) -> &MemberKey {
        self.operation.member()
    }
}

#[derive(Debug, Error)]
pub enum StrideError {
    /// Transport failure. Retry the whole reconciliation pass, not the
    /// single call: the backend state may have moved in the meantime.
    #[error("network error: {0}")]
    Network(String),

    #[error("a request from {from} to {to} is already pending")]
    DuplicateRequest { from: MemberKey, to: MemberKey },

    #[error("{} membership operation(s) failed: {}", .failed.len(), failed_members(.failed))]
    PartialApply { failed: Vec<FailedOperation> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("backend error {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{message}")]
    MaxRetriesExceeded { attempts: u32, message: String },
}

fn failed_members(failed: &[FailedOperation]) -> String {
    failed
        .iter()
        .map(|f| f.member().as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl StrideError {
    /// Transient failures worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            StrideError::Network(_) | StrideError::RateLimited { .. } => true,
            StrideError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_duplicate_request(&self) -> bool {
        matches!(self, StrideError::DuplicateRequest { .. })
    }
}

impl From<reqwest::Error> for StrideError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StrideError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            StrideError::Api {
                status: status.as_u16(),
                detail: err.to_string(),
            }
        } else {
            StrideError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StrideError {
    fn from(err: serde_json::Error) -> Self {
        StrideError::Parse(err.to_string())
    }
}
