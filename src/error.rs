//! Error types.
//!
//! Host primitives report failures as [`HostError`]. The reconciler wraps them
//! in [`ReconcileError`], which also says how far the failed cycle got: a
//! render-phase failure never touched the output tree, a commit-phase failure
//! was undone before it was reported.

use thiserror::Error;

/// Failure reported by a host rendering primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation}: {message}")]
pub struct HostError {
    /// Primitive that failed, e.g. `append_child`.
    pub operation: &'static str,
    /// Host-specific description.
    pub message: String,
}

impl HostError {
    /// Create a host error for `operation`.
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Failure of a render cycle.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A host primitive failed while materializing nodes; nothing was committed.
    #[error("render aborted by host failure: {0}")]
    Host(#[from] HostError),

    /// A host primitive failed mid-commit; applied mutations were undone.
    #[error("commit rolled back after {rolled_back} mutation(s): {source}")]
    CommitRolledBack {
        /// The failure that aborted the commit.
        #[source]
        source: HostError,
        /// Number of mutations that were applied and then undone.
        rolled_back: usize,
    },
}

/// Result alias for reconciler operations.
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
