use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure talking to the remote inbox service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// One kind per request family; recorded in the store when a remote call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    FetchFailed,
    WriteFailed,
    AssignmentFailed,
    NoteOperationFailed,
    DeleteFailed,
    RemapFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::FetchFailed => "fetch failed",
            FailureKind::WriteFailed => "write failed",
            FailureKind::AssignmentFailed => "assignment failed",
            FailureKind::NoteOperationFailed => "note operation failed",
            FailureKind::DeleteFailed => "delete failed",
            FailureKind::RemapFailed => "remap failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    #[error(transparent)]
    Failed(#[from] Failure),
    #[error("request cancelled")]
    Cancelled,
    #[error("coordinator task ended before replying")]
    CoordinatorGone,
    #[error("no client is selected")]
    NotSelected,
    #[error("request resolved to an unexpected outcome: {0}")]
    UnexpectedOutcome(String),
    #[error("conversation {0} has no assignee")]
    Unassigned(String),
    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),
    #[error("config error: {0}")]
    Config(String),
}
