use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    pending: Mutex<HashMap<String, Pending>>,
    next_generation: AtomicU64,
    /// Tasks that are either waiting for their deadline or running
    /// their action
    active: AtomicUsize,
    idle: Notify,
}

/// Coalesces bursts of actions per key: each `schedule` for a key
/// replaces the action waiting for that key and restarts its timer,
/// so only the last action of a burst runs, `delay` after the last
/// call. Keys are independent of each other.
#[derive(Clone, Default)]
pub struct Debouncer {
    inner: Arc<Inner>,
}

/// Decrements the active count when the task finishes or is aborted
struct ActiveGuard(Arc<Inner>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<K, F>(&self, key: K, delay: Duration, action: F)
    where
        K: Into<String>,
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);

        let mut pending = self.inner.pending.lock();
        if let Some(previous) = pending.remove(&key) {
            log::trace!("debounce {key}: replacing pending action");
            previous.handle.abort();
        }

        self.inner.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(self.inner.clone());
        let inner = self.inner.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(delay).await;

            // Once the entry is gone the action can no longer be
            // aborted by a later schedule or cancel
            {
                let mut pending = inner.pending.lock();
                match pending.get(&task_key) {
                    Some(p) if p.generation == generation => {
                        pending.remove(&task_key);
                    }
                    _ => return,
                }
            }

            action.await;
        });

        pending.insert(key, Pending { generation, handle });
    }

    /// Discards the pending action for `key` without running it.
    /// Returns true if there was one.
    pub fn cancel(&self, key: &str) -> bool {
        match self.inner.pending.lock().remove(key) {
            Some(previous) => {
                log::trace!("debounce {key}: cancelled pending action");
                previous.handle.abort();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.pending.lock().contains_key(key)
    }

    /// Waits until no action is waiting or running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
