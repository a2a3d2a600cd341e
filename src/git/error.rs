//! Git sync error types.

use std::path::PathBuf;

use thiserror::Error;

/// Whether retrying a failed sync may succeed without operator action.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    Permanent,
    Retryable,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// Errors that can occur during git sync operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncError {
    /// Single-flight gate; the exact wording is part of the API.
    #[error("sync already in flight")]
    AlreadyInFlight,

    #[error("failed to open repository at {0}: {1}")]
    OpenRepo(PathBuf, #[source] git2::Error),

    #[error("failed to initialize repository at {0}: {1}")]
    InitRepo(PathBuf, #[source] git2::Error),

    #[error("failed to fetch from remote: {0}")]
    Fetch(#[source] git2::Error),

    /// The remote branch simply does not exist yet. Not a failure: the
    /// coordinator bootstraps the branch by committing and pushing.
    #[error("remote branch not found: origin/{0}")]
    RemoteBranchAbsent(String),

    #[error("failed to stage working tree: {0}")]
    Stage(#[source] git2::Error),

    #[error("failed to create commit: {0}")]
    Commit(#[source] git2::Error),

    #[error("failed to push: {0}")]
    Push(#[source] git2::Error),

    #[error("push rejected: {message}")]
    PushRejected { message: String },

    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("bucket i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether the next sync trigger may succeed from scratch.
    pub fn transience(&self) -> Transience {
        match self {
            SyncError::AlreadyInFlight
            | SyncError::Fetch(_)
            | SyncError::RemoteBranchAbsent(_)
            | SyncError::Push(_)
            | SyncError::PushRejected { .. }
            | SyncError::Io(_) => Transience::Retryable,

            SyncError::OpenRepo(_, _)
            | SyncError::InitRepo(_, _)
            | SyncError::Stage(_)
            | SyncError::Commit(_)
            | SyncError::Git(_) => Transience::Permanent,
        }
    }

    /// Typed check first; the message sniff covers transports that report
    /// a missing remote ref as a generic error.
    pub fn is_remote_branch_absent(&self) -> bool {
        match self {
            SyncError::RemoteBranchAbsent(_) => true,
            SyncError::Fetch(err) | SyncError::Git(err) => {
                err.code() == git2::ErrorCode::NotFound
                    && err.message().contains("remote")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_message_is_stable() {
        assert_eq!(SyncError::AlreadyInFlight.to_string(), "sync already in flight");
    }

    #[test]
    fn remote_branch_absent_is_retryable_and_detected() {
        let err = SyncError::RemoteBranchAbsent("main".to_string());
        assert!(err.is_remote_branch_absent());
        assert!(err.transience().is_retryable());
    }
}
