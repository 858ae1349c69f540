// src/core/coord/memory.rs

//! An in-memory `CoordClient`, used by tests and by a single-node
//! development binary in place of a real coordination-store client (which
//! is explicitly out of scope for this crate).

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::{CoordClient, CoordEvent, CoordEventStream};
use crate::core::errors::MasterError;

#[derive(Debug, Clone)]
struct Node {
    data: Bytes,
    version: i64,
    ephemeral: bool,
}

/// A process-local tree shared by every `InMemoryCoordClient` session
/// pointed at it, so that tests can simulate multiple masters racing for
/// the same ephemeral node.
#[derive(Debug)]
pub struct SharedStore {
    nodes: DashMap<String, Node>,
    events: broadcast::Sender<CoordEvent>,
}

impl SharedStore {
    pub fn new() -> Arc<Self> {
        let (events, _rx) = broadcast::channel(1024);
        Arc::new(Self {
            nodes: DashMap::new(),
            events,
        })
    }

    fn publish(&self, event: CoordEvent) {
        let _ = self.events.send(event);
    }
}

/// An in-memory session against a [`SharedStore`].
///
/// `session_alive` flips to `false` when [`InMemoryCoordClient::expire_session`]
/// is called, which drops every ephemeral node this session created and
/// emits [`CoordEvent::SessionExpired`] — the one event `MasterLoop` treats
/// as unconditionally fatal.
pub struct InMemoryCoordClient {
    store: Arc<SharedStore>,
    session_id: u64,
    session_alive: AtomicBool,
    ephemeral_paths: DashMap<String, ()>,
    next_version: AtomicI64,
}

impl InMemoryCoordClient {
    pub fn new(store: Arc<SharedStore>, session_id: u64) -> Self {
        Self {
            store,
            session_id,
            session_alive: AtomicBool::new(true),
            ephemeral_paths: DashMap::new(),
            next_version: AtomicI64::new(1),
        }
    }

    fn check_alive(&self) -> Result<(), MasterError> {
        if self.session_alive.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(MasterError::CoordUnavailable(
                "session expired".to_string(),
            ))
        }
    }

    /// Simulates loss of this client's session: removes every ephemeral
    /// node it owns and broadcasts `SessionExpired`.
    pub fn expire_session(&self) {
        self.session_alive.store(false, Ordering::Release);
        for entry in self.ephemeral_paths.iter() {
            let path = entry.key().clone();
            if self.store.nodes.remove(&path).is_some() {
                self.store.publish(CoordEvent::Deleted { path });
            }
        }
        self.store.publish(CoordEvent::SessionExpired);
    }
}

#[async_trait]
impl CoordClient for InMemoryCoordClient {
    async fn create_ephemeral(&self, path: &str, data: Bytes) -> Result<(), MasterError> {
        self.check_alive()?;
        if self.store.nodes.contains_key(path) {
            return Err(MasterError::CoordUnavailable(format!(
                "node already exists at {path}"
            )));
        }
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        self.store.nodes.insert(
            path.to_string(),
            Node {
                data: data.clone(),
                version,
                ephemeral: true,
            },
        );
        self.ephemeral_paths.insert(path.to_string(), ());
        self.store.publish(CoordEvent::Created {
            path: path.to_string(),
            data,
        });
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<(Bytes, i64)>, MasterError> {
        self.check_alive()?;
        Ok(self
            .store
            .nodes
            .get(path)
            .map(|n| (n.data.clone(), n.version)))
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, MasterError> {
        self.check_alive()?;
        let prefix = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let mut children: Vec<String> = self
            .store
            .nodes
            .iter()
            .filter_map(|entry| {
                entry
                    .key()
                    .strip_prefix(&prefix)
                    .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                    .map(|rest| rest.to_string())
            })
            .collect();
        children.sort();
        Ok(children)
    }

    async fn delete(&self, path: &str, version: Option<i64>) -> Result<(), MasterError> {
        self.check_alive()?;
        if let Some(expected) = version
            && let Some(node) = self.store.nodes.get(path)
            && node.version != expected
        {
            return Err(MasterError::CoordUnavailable(format!(
                "version mismatch deleting {path}"
            )));
        }
        if self.store.nodes.remove(path).is_some() {
            self.ephemeral_paths.remove(path);
            self.store.publish(CoordEvent::Deleted {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    async fn watch(&self, path: &str) -> Result<CoordEventStream, MasterError> {
        self.check_alive()?;
        let path = path.to_string();
        let rx = self.store.events.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(move |res| {
            let keep = match res.as_ref().ok() {
                Some(
                    CoordEvent::Created { path: p, .. }
                    | CoordEvent::DataChanged { path: p, .. }
                    | CoordEvent::Deleted { path: p },
                ) => p == &path,
                Some(CoordEvent::SessionExpired) => true,
                None => false,
            };
            futures::future::ready(if keep { res.ok() } else { None })
        });
        Ok(Box::pin(stream))
    }

    fn session_events(&self) -> CoordEventStream {
        let rx = self.store.events.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|res| {
            let keep = matches!(res, Ok(CoordEvent::SessionExpired));
            futures::future::ready(if keep { res.ok() } else { None })
        });
        Box::pin(stream)
    }

    fn session_id(&self) -> u64 {
        self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_one_contender_wins_the_ephemeral_node() {
        let store = SharedStore::new();
        let a = InMemoryCoordClient::new(store.clone(), 1);
        let b = InMemoryCoordClient::new(store.clone(), 2);

        assert!(
            a.create_ephemeral("/master", Bytes::from_static(b"a"))
                .await
                .is_ok()
        );
        assert!(
            b.create_ephemeral("/master", Bytes::from_static(b"b"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn expiring_a_session_drops_its_ephemeral_nodes() {
        let store = SharedStore::new();
        let a = InMemoryCoordClient::new(store.clone(), 1);
        a.create_ephemeral("/master", Bytes::from_static(b"a"))
            .await
            .unwrap();
        a.expire_session();
        assert!(a.read("/master").await.unwrap().is_none());
        assert!(a.create_ephemeral("/x", Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn list_returns_immediate_children_only() {
        let store = SharedStore::new();
        let a = InMemoryCoordClient::new(store.clone(), 1);
        a.create_ephemeral("/rs/one", Bytes::new()).await.unwrap();
        a.create_ephemeral("/rs/two", Bytes::new()).await.unwrap();
        let mut children = a.list("/rs").await.unwrap();
        children.sort();
        assert_eq!(children, vec!["one".to_string(), "two".to_string()]);
    }
}
