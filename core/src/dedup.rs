//! Coalescing of concurrent identical requests.
//!
//! # Design
//! `InflightCache` maps a request key to a `Shared` future. The first caller
//! for a key creates the future; later callers clone it and poll the same
//! computation. The future removes its own key when it settles, before the
//! result is handed out, so a settled result is never served from the map.
//! Eviction also happens if the call panics. `start` runs on the first poll,
//! outside the map lock, which is never held across an `.await`.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

type Pending<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;
type PendingMap<T, E> = Mutex<HashMap<String, Pending<T, E>>>;

/// In-flight request registry. Clones share the same map.
pub struct InflightCache<T, E> {
    pending: Arc<PendingMap<T, E>>,
}

impl<T, E> Clone for InflightCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T, E> Default for InflightCache<T, E> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T, E> InflightCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the pending call for `key`, or start one with `start`.
    ///
    /// `start` is only invoked when nothing is pending for `key`, and not
    /// before the returned future is first polled.
    pub fn run<F, Fut>(&self, key: impl Into<String>, start: F) -> Pending<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let key = key.into();
        let mut pending = lock(&self.pending);
        if let Some(existing) = pending.get(&key) {
            debug!(%key, "joining in-flight request");
            return existing.clone();
        }

        let registry = Arc::clone(&self.pending);
        let evict = key.clone();
        let shared = async move {
            let outcome = AssertUnwindSafe(async move { start().await })
                .catch_unwind()
                .await;
            lock(&registry).remove(&evict);
            match outcome {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            }
        }
        .boxed()
        .shared();

        pending.insert(key, shared.clone());
        shared
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }
}

// The map is left consistent by every critical section, so a poisoned lock
// is still safe to use.
fn lock<T, E>(map: &PendingMap<T, E>) -> MutexGuard<'_, HashMap<String, Pending<T, E>>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
