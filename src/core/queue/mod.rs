// src/core/queue/mod.rs

//! The single FIFO that feeds `MasterLoop`: a bounded `tokio::sync::mpsc`
//! channel plus an attempt-counter side-table, since `mpsc` has no native
//! requeue-to-tail.
//!
//! Heterogeneous inputs (heartbeats, admin RPCs, coordination-store
//! events) fan in at the producer side into one `mpsc::Sender`, so
//! `MasterLoop` only ever has to drain a single receiver.

use tokio::sync::mpsc;

use crate::core::server_info::ServerInfo;

/// What the region-server-facing `Report` RPC observed since the last
/// heartbeat: a region it finished opening, closing, or splitting. Carried
/// piggybacked on `Report` rather than sent as its own RPC, same as the
/// directives that travel the other way.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportMessage {
    RegionOpened { region_id: u64 },
    RegionClosed { region_id: u64 },
    RegionSplit { parent_region_id: u64, daughter_region_ids: (u64, u64) },
}

/// An admin-originated action dispatched through `modify_table`, carried
/// as a tagged variant with its own typed payload rather than an
/// op-tag-plus-args array.
#[derive(Debug, Clone)]
pub enum AdminAction {
    Split { region_id: u64 },
    Compact { region_id: u64 },
    MajorCompact { region_id: u64 },
    Flush { region_id: u64 },
    ExplicitSplit { region_id: u64, split_point: bytes::Bytes },
    MoveRegion { region_id: u64, target_server: String },
    CloseRegion { region_id: u64 },
}

/// One unit of work for `MasterLoop`, plus an internal `Shutdown`
/// variant that exists purely to unblock a waiting
/// `recv` deterministically during a graceful drain rather than relying on
/// the `thread_wake_frequency` poll to notice `closed`.
///
/// `Report` is deliberately absent here: its reply carries directives the
/// caller must wait for, so it travels as an `RpcCall` with a `oneshot`
/// reply alongside `CreateTable` and the other synchronous admin calls,
/// not as a fire-and-forget queue item.
#[derive(Debug, Clone)]
pub enum OperationItem {
    ProcessServerStartup { server: ServerInfo },
    ProcessServerDeath { server_name: String },
    ProcessRegionSplit { parent_region_id: u64, daughter_region_ids: (u64, u64) },
    ProcessRegionOpened { region_id: u64, server_name: String },
    ProcessRegionClosed { region_id: u64 },
    AdminAction(AdminAction),
    Shutdown,
}

/// The outcome of processing one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed,
    Noop,
    Requeued,
    RequeuedButProblem,
    Failed,
}

/// A dequeued item tagged with its attempt count, so `MasterLoop` can
/// decide whether the next `Requeued` outcome should become `Failed`.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub item: OperationItem,
    pub attempt: u32,
}

/// The sender half, cloned into every RPC handler and the session-event
/// task. Enqueueing never blocks indefinitely: a full queue applies
/// backpressure to the caller via `mpsc`'s bounded-send `.await`.
#[derive(Clone)]
pub struct OperationQueueHandle {
    tx: mpsc::Sender<QueuedItem>,
}

impl OperationQueueHandle {
    pub async fn enqueue(&self, item: OperationItem) -> Result<(), OperationItem> {
        self.tx
            .send(QueuedItem { item, attempt: 0 })
            .await
            .map_err(|e| e.0.item)
    }

    fn clone_sender(&self) -> mpsc::Sender<QueuedItem> {
        self.tx.clone()
    }
}

/// The single consumer, owned exclusively by `MasterLoop`.
pub struct OperationQueue {
    rx: mpsc::Receiver<QueuedItem>,
    tx: mpsc::Sender<QueuedItem>,
    max_attempts: u32,
}

impl OperationQueue {
    pub fn new(capacity: usize, max_attempts: u32) -> (Self, OperationQueueHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = OperationQueueHandle { tx: tx.clone() };
        (Self { rx, tx, max_attempts }, handle)
    }

    pub fn handle(&self) -> OperationQueueHandle {
        OperationQueueHandle {
            tx: self.clone_sender(),
        }
    }

    fn clone_sender(&self) -> mpsc::Sender<QueuedItem> {
        self.tx.clone()
    }

    /// Pops the next item, waiting up to `timeout` (the configured
    /// `thread_wake_frequency`). `None` means the wait elapsed with no item
    /// ready.
    pub async fn recv(&mut self, timeout: std::time::Duration) -> Option<QueuedItem> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Pushes `item` back onto the tail with its attempt counter
    /// incremented. Returns `Failed` in place of a requeue once
    /// `max_attempts` is exceeded.
    pub async fn requeue(&self, mut queued: QueuedItem) -> ProcessOutcome {
        queued.attempt += 1;
        if queued.attempt > self.max_attempts {
            return ProcessOutcome::Failed;
        }
        match self.tx.send(queued).await {
            Ok(()) => ProcessOutcome::Requeued,
            Err(_) => ProcessOutcome::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recv_times_out_on_an_empty_queue() {
        let (mut queue, _handle) = OperationQueue::new(8, 2);
        let item = queue.recv(std::time::Duration::from_millis(10)).await;
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn enqueued_items_are_received_in_order() {
        let (mut queue, handle) = OperationQueue::new(8, 2);
        handle
            .enqueue(OperationItem::ProcessRegionOpened {
                region_id: 1,
                server_name: "rs1".into(),
            })
            .await
            .unwrap();
        handle
            .enqueue(OperationItem::ProcessRegionOpened {
                region_id: 2,
                server_name: "rs1".into(),
            })
            .await
            .unwrap();
        let first = queue.recv(std::time::Duration::from_secs(1)).await.unwrap();
        let second = queue.recv(std::time::Duration::from_secs(1)).await.unwrap();
        match (first.item, second.item) {
            (
                OperationItem::ProcessRegionOpened { region_id: a, .. },
                OperationItem::ProcessRegionOpened { region_id: b, .. },
            ) => assert!(a < b),
            _ => panic!("unexpected item shape"),
        }
    }

    #[tokio::test]
    async fn requeue_fails_the_item_past_max_attempts() {
        let (queue, handle) = OperationQueue::new(8, 1);
        handle
            .enqueue(OperationItem::ProcessServerDeath {
                server_name: "rs1".into(),
            })
            .await
            .unwrap();
        let queued = QueuedItem {
            item: OperationItem::ProcessServerDeath {
                server_name: "rs1".into(),
            },
            attempt: 1,
        };
        let outcome = queue.requeue(queued).await;
        assert_eq!(outcome, ProcessOutcome::Failed);
    }
}
