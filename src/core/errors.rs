// src/core/errors.rs

//! Defines the primary error type for the master control plane.

use std::sync::Arc;
use thiserror::Error;

use crate::core::assignment::AssignmentState;

/// The main error enum, representing all possible failures within the master.
///
/// `thiserror` gives us `Display`/`Error` impls and `From` conversions for the
/// handful of upstream error types this crate actually produces.
#[derive(Error, Debug, Clone)]
pub enum MasterError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("master is not running")]
    MasterNotRunning,

    #[error("not all META regions are online")]
    NotAllMetaRegionsOnline,

    #[error("insufficient region servers to satisfy the request")]
    InsufficientServers,

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("'{0}' is a protected catalog table and cannot be mutated this way")]
    ProtectedTable(String),

    #[error("illegal assignment transition for region {region_id}: {from:?} -> {to:?}")]
    IllegalAssignmentTransition {
        region_id: u64,
        from: AssignmentState,
        to: AssignmentState,
    },

    #[error("split point is outside the region's key range")]
    InvalidSplitPoint,

    #[error("coordination store unavailable: {0}")]
    CoordUnavailable(String),

    #[error("DFS is unavailable; cluster cannot make progress")]
    FatalDfsUnavailable,

    #[error("on-disk layout version is incompatible: expected {expected}, found {found}")]
    IncompatibleVersion { expected: String, found: String },

    #[error("master is shutting down")]
    MasterShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

/// How `MasterLoop::process` should treat a failed `OperationItem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Requeue with backoff, up to `num_retries`.
    Transient,
    /// Stop the loop; an operator must intervene.
    Fatal,
}

/// Classifies an error for the retry/fatal policy.
///
/// Coordination and DFS unavailability are transient by default: a brief
/// partition or a slow rename should not take the whole master down. Once a
/// caller has exhausted retries it is `MasterLoop`'s job to escalate a
/// transient failure into a fatal one, not this function's.
pub fn classify(err: &MasterError) -> ErrorClass {
    match err {
        MasterError::CoordUnavailable(_) => ErrorClass::Transient,
        MasterError::Io(_) => ErrorClass::Transient,
        MasterError::FatalDfsUnavailable => ErrorClass::Fatal,
        MasterError::IncompatibleVersion { .. } => ErrorClass::Fatal,
        MasterError::MasterShuttingDown => ErrorClass::Fatal,
        _ => ErrorClass::Transient,
    }
}

impl From<std::io::Error> for MasterError {
    fn from(e: std::io::Error) -> Self {
        MasterError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for MasterError {
    fn from(e: serde_json::Error) -> Self {
        MasterError::Internal(format!("serialization error: {e}"))
    }
}

impl From<std::num::ParseIntError> for MasterError {
    fn from(e: std::num::ParseIntError) -> Self {
        MasterError::Internal(format!("failed to parse integer: {e}"))
    }
}
