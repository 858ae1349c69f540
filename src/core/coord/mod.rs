// src/core/coord/mod.rs

//! A thin typed wrapper over the coordination store: sessions, ephemeral
//! nodes, watches. The coordination store itself is an external
//! collaborator; this module only defines the contract a production
//! client must satisfy and the typed event stream `MasterLoop` folds into
//! its `OperationQueue`.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::core::errors::MasterError;

/// An event observed on a coordination-store path, translated into a
/// typed variant rather than left as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordEvent {
    Created { path: String, data: Bytes },
    DataChanged { path: String, data: Bytes },
    Deleted { path: String },
    /// The client's session expired. The consumer (`MasterLoop`) must
    /// treat this as fatal and exit so a standby can take over; it is not
    /// retried.
    SessionExpired,
}

pub type CoordEventStream = Pin<Box<dyn Stream<Item = CoordEvent> + Send>>;

/// The contract a coordination-store client satisfies.
///
/// Implemented by a production client (not provided by this crate — the
/// coordination store is an external collaborator) and by
/// [`memory::InMemoryCoordClient`], the in-process double used by tests and
/// by a single-node development binary.
#[async_trait]
pub trait CoordClient: Send + Sync {
    /// Creates an ephemeral node at `path`. Fails with
    /// [`MasterError::CoordUnavailable`] if a node already exists there or
    /// the store cannot be reached after configured retries.
    async fn create_ephemeral(&self, path: &str, data: Bytes) -> Result<(), MasterError>;

    /// Reads the value and version at `path`, or `None` if it does not exist.
    async fn read(&self, path: &str) -> Result<Option<(Bytes, i64)>, MasterError>;

    /// Lists the immediate children of `path`.
    async fn list(&self, path: &str) -> Result<Vec<String>, MasterError>;

    /// Deletes `path`. If `version` is `Some`, the delete is conditional on
    /// the node still being at that version (a compare-and-delete).
    async fn delete(&self, path: &str, version: Option<i64>) -> Result<(), MasterError>;

    /// Registers a watch on `path`, returning a stream of subsequent events
    /// for it. A losing leader-election contender uses this to block until
    /// the winner's ephemeral node vanishes.
    async fn watch(&self, path: &str) -> Result<CoordEventStream, MasterError>;

    /// A stream of session-lifecycle events for this client's own session,
    /// merged into the `OperationQueue` alongside RPC-originated items.
    fn session_events(&self) -> CoordEventStream;

    /// This client's session identifier, used to distinguish reincarnation
    /// across a reconnect.
    fn session_id(&self) -> u64;
}
