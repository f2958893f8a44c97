//! ============================================================================
//! Sync Queue - Single-flight outbound delivery for one session
//! ============================================================================
//! Callers enqueue without waiting. One detached worker drains the queue in
//! FIFO order, so a slow round-trip can delay later syncs but never let an
//! older snapshot land after a newer one. Failures are logged and dropped.
//! ============================================================================

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::types::{SessionRecord, SessionUpdate};
use crate::backend::RemoteStore;

/// One outbound sync
#[derive(Debug, Clone)]
pub(crate) enum SyncOp {
    Register(SessionRecord),
    Update {
        visitor_id: String,
        update: SessionUpdate,
    },
    Finalize(SessionRecord),
}

impl SyncOp {
    fn label(&self) -> &'static str {
        match self {
            Self::Register(_) => "register",
            Self::Update { .. } => "update",
            Self::Finalize(_) => "finalize",
        }
    }
}

pub(crate) struct SyncQueue {
    tx: Option<mpsc::UnboundedSender<SyncOp>>,
    worker: Option<JoinHandle<()>>,
}

impl SyncQueue {
    /// Queue that silently discards everything (remote sync disabled)
    pub(crate) fn disabled() -> Self {
        Self {
            tx: None,
            worker: None,
        }
    }

    /// Start a worker on the current tokio runtime. Without a runtime the
    /// queue is disabled instead of panicking.
    pub(crate) fn spawn(remote: Arc<dyn RemoteStore>) -> Self {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, telemetry remote sync disabled");
                return Self::disabled();
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = handle.spawn(drain(remote, rx));
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Fire-and-forget enqueue
    pub(crate) fn push(&self, op: SyncOp) {
        if let Some(tx) = &self.tx {
            if tx.send(op).is_err() {
                warn!("Telemetry sync worker has stopped, dropping sync");
            }
        }
    }

    /// Stop accepting work and wait up to `grace` for queued syncs to finish.
    /// Returns false if the deadline passed first; the worker keeps running
    /// detached in that case.
    pub(crate) async fn close(&mut self, grace: Duration) -> bool {
        self.tx.take();
        match self.worker.take() {
            Some(worker) => match tokio::time::timeout(grace, worker).await {
                Ok(_) => true,
                Err(_) => {
                    warn!("Telemetry sync did not drain within {:?}", grace);
                    false
                }
            },
            None => true,
        }
    }
}

async fn drain(remote: Arc<dyn RemoteStore>, mut rx: mpsc::UnboundedReceiver<SyncOp>) {
    while let Some(op) = rx.recv().await {
        let label = op.label();
        let result = match &op {
            SyncOp::Register(record) => remote.insert_session(record).await,
            SyncOp::Update { visitor_id, update } => {
                remote.update_session(visitor_id, update).await
            }
            SyncOp::Finalize(record) => remote.upsert_session(record).await,
        };

        match result {
            Ok(()) => debug!("Telemetry {} sync delivered", label),
            Err(e) => warn!("Telemetry {} sync failed: {}", label, e),
        }
    }
    debug!("Telemetry sync worker finished");
}
