//! Page workflows: form entry, search and bulk edit.
//!
//! Workflows own the per-page state (form values, result set, pending
//! changes) and turn every failure into an [`OperationOutcome`] at their
//! boundary. Nothing here retries; a failed action waits for the user.

pub mod bulk_edit;
pub mod form;
pub mod search;

use serde::Serialize;

use crate::data::DataError;
use crate::workflow::form::FieldKind;

pub use bulk_edit::{BulkEditWorkflow, CommitMode, CommitState, PendingChanges};
pub use form::{FieldSet, FieldSpec, FormState, FormWorkflow};
pub use search::{MatchMode, SearchPredicate, SearchRequest, SearchTicket, SearchWorkflow};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required fields")]
    MissingRequired,
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("field `{field}` expects a {expected} value")]
    TypeMismatch { field: String, expected: FieldKind },
    #[error("field `{0}` is not a number")]
    InvalidNumber(String),
    #[error("field `{0}` is not editable here")]
    NotEditable(String),
    #[error("empty query")]
    EmptyQuery,
    #[error("unknown record")]
    UnknownRecord,
    #[error("no pending changes")]
    NothingToCommit,
    #[error("previous commit outcome not acknowledged")]
    CommitNotAcknowledged,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Query(#[source] DataError),
    #[error("{0}")]
    Write(#[source] DataError),
    #[error("commit stopped after {applied} of {total} updates: {source}")]
    PartialCommit {
        applied: usize,
        total: usize,
        source: DataError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitProgress {
    pub applied: usize,
    pub total: usize,
}

/// Result of one user action, rendered in the page's message region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationOutcome {
    Success {
        message: String,
    },
    Failure {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        progress: Option<CommitProgress>,
    },
    /// The query succeeded and matched nothing.
    Empty,
}

impl OperationOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        OperationOutcome::Success {
            message: message.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        OperationOutcome::Failure {
            reason: reason.into(),
            progress: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, OperationOutcome::Failure { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            OperationOutcome::Failure { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn progress(&self) -> Option<CommitProgress> {
        match self {
            OperationOutcome::Failure { progress, .. } => *progress,
            _ => None,
        }
    }
}

impl From<WorkflowError> for OperationOutcome {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::PartialCommit {
                applied,
                total,
                source,
            } => OperationOutcome::Failure {
                reason: source.to_string(),
                progress: Some(CommitProgress { applied, total }),
            },
            other => OperationOutcome::failure(other.to_string()),
        }
    }
}

impl From<ValidationError> for OperationOutcome {
    fn from(err: ValidationError) -> Self {
        WorkflowError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_commit_keeps_counts() {
        let outcome: OperationOutcome = WorkflowError::PartialCommit {
            applied: 1,
            total: 2,
            source: DataError::Rejected("row locked".into()),
        }
        .into();

        assert_eq!(outcome.reason(), Some("row locked"));
        assert_eq!(outcome.progress(), Some(CommitProgress { applied: 1, total: 2 }));
    }

    #[test]
    fn timeout_surfaces_as_plain_reason() {
        let outcome: OperationOutcome = WorkflowError::Query(DataError::Timeout).into();
        assert_eq!(outcome, OperationOutcome::failure("timeout"));
    }

    #[test]
    fn outcome_serializes_tagged() {
        let json = serde_json::to_value(OperationOutcome::failure("empty query")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "failure", "reason": "empty query"}));
        let json = serde_json::to_value(OperationOutcome::Empty).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "empty"}));
    }
}
