//! Long-poll notify handles and their reuse pool

use beacon_api::InstanceInfo;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Payload delivered to a woken long-poll waiter: the changed appids and
/// their current views.
pub type PollResult = HashMap<String, InstanceInfo>;

// A waiter subscribed to several appids can receive one signal per appid
// before the transport drains any of them.
const CHAN_CAPACITY: usize = 5;

const POOL_CAPACITY: usize = 128;

/// A one-shot-per-poll notification channel handed to a long-poll waiter.
///
/// The registry signals through `notify` without blocking; the transport
/// awaits `wait` under its own deadline. Handles are pooled and reused, so
/// a handle must be drained of stale signals before it is reissued.
pub struct NotifyHandle {
    tx: mpsc::Sender<PollResult>,
    rx: Mutex<mpsc::Receiver<PollResult>>,
}

impl NotifyHandle {
    pub(crate) fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel(CHAN_CAPACITY);
        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
        })
    }

    /// Block until the registry signals this handle. Returns None only if
    /// the handle has been torn down.
    pub async fn wait(&self) -> Option<PollResult> {
        self.rx.lock().await.recv().await
    }

    /// Non-blocking signal. Returns false when the channel is full, which
    /// the caller logs and tolerates: the waiter already has a wakeup
    /// pending.
    pub(crate) fn notify(&self, result: PollResult) -> bool {
        self.tx.try_send(result).is_ok()
    }

    /// Discard any pending signals. A no-op while a waiter still holds the
    /// receiver.
    fn drain(&self) {
        if let Ok(mut rx) = self.rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
    }
}

/// Free list of notify handles. Its lock is independent of the directory
/// shards and the waiter map.
pub(crate) struct ChanPool {
    free: Mutex<Vec<Arc<NotifyHandle>>>,
}

impl ChanPool {
    pub(crate) fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Draw a handle, allocating when the pool is empty. The bool is true
    /// for a freshly allocated handle. A reissued handle starts clean: any
    /// signal that landed between pooling and reissue is discarded here.
    pub(crate) async fn get(&self) -> (Arc<NotifyHandle>, bool) {
        if let Some(handle) = self.free.lock().await.pop() {
            handle.drain();
            return (handle, false);
        }
        (NotifyHandle::new(), true)
    }

    /// Return a handle for reuse. Waiters that shared one subscription
    /// return the same handle once each; only the last return may pool it,
    /// so a handle with other live references is dropped instead. Pooled
    /// handles are drained of stale signals, and overflow beyond the pool
    /// capacity is dropped.
    pub(crate) async fn put(&self, handle: Arc<NotifyHandle>) {
        if Arc::strong_count(&handle) != 1 {
            debug!("notify handle still shared, dropping instead of pooling");
            return;
        }
        handle.drain();
        let mut free = self.free.lock().await;
        if free.len() < POOL_CAPACITY {
            free.push(handle);
        }
    }
}
