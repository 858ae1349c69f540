// src/core/logsplit/mod.rs

//! On region-server death: rename its WAL directory and invoke the
//! external split routine under a process-wide lock.
//!
//! Holds a lock across an `.await`ed external reconfiguration call and
//! records the outcome in metrics; the lock is one process-wide
//! `split_log_lock` rather than per-key, so at most one split runs at a
//! time to bound DFS load.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::core::errors::MasterError;
use crate::core::metrics;

/// `(duration, file_count, bytes)` recorded once a split completes.
#[derive(Debug, Clone, Copy)]
pub struct SplitOutcome {
    pub duration: std::time::Duration,
    pub file_count: u64,
    pub bytes: u64,
}

/// The process-wide serialization point for WAL split recovery. Held
/// across the external split routine's `.await` so only one server's logs
/// are being split at a time.
pub struct LogSplitter {
    rootdir: PathBuf,
    split_log_lock: Arc<Mutex<()>>,
}

impl LogSplitter {
    pub fn new(rootdir: PathBuf) -> Self {
        Self {
            rootdir,
            split_log_lock: Arc::new(Mutex::new(())),
        }
    }

    fn log_dir(&self, server_name: &str) -> PathBuf {
        self.rootdir.join(".logs").join(server_name)
    }

    fn splitting_dir(&self, server_name: &str) -> PathBuf {
        self.rootdir.join(".logs").join(format!("{server_name}-splitting"))
    }

    /// Drives recovery for one dead server: acquires `split_log_lock`,
    /// renames `.logs/<server>` to `.logs/<server>-splitting` (rejecting a
    /// rogue revival under the original name), invokes `split_routine`,
    /// and records metrics on success. The lock is released on every exit
    /// path via `MutexGuard`'s `Drop`, including when `split_routine`
    /// errors.
    ///
    /// `split_routine` is the external collaborator: the WAL split
    /// algorithm itself is out of scope for this crate.
    pub async fn recover_server<F, Fut>(
        &self,
        server_name: &str,
        split_routine: F,
    ) -> Result<SplitOutcome, MasterError>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: std::future::Future<Output = Result<SplitOutcome, MasterError>>,
    {
        let _guard = self.split_log_lock.lock().await;
        let started = Instant::now();

        let from = self.log_dir(server_name);
        let to = self.splitting_dir(server_name);
        rename_log_dir(&from, &to).await?;

        match split_routine(to.clone()).await {
            Ok(outcome) => {
                metrics::record_log_split(outcome.duration, outcome.file_count, outcome.bytes);
                let _ = tokio::fs::remove_dir_all(&to).await;
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(server = server_name, error = %e, elapsed = ?started.elapsed(), "log split failed, leaving directory for retry on next startup");
                Err(e)
            }
        }
    }
}

async fn rename_log_dir(from: &Path, to: &Path) -> Result<(), MasterError> {
    if tokio::fs::metadata(to).await.is_ok() {
        return Err(MasterError::Internal(format!(
            "log directory {} already mid-split",
            to.display()
        )));
    }
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(from, to).await.map_err(|e| e.into())
}
