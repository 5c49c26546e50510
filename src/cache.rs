//! Memo store for fetched details with at most one outstanding fetch per key.

use crate::error::{BrowseError, Result};
use crate::model::Detail;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

type PendingFetch = Shared<BoxFuture<'static, Result<Arc<Detail>>>>;

enum Slot {
    Ready(Arc<Detail>),
    Pending { fetch_id: u64, fetch: PendingFetch },
}

/// Details keyed by sysId, populated once and never evicted.
///
/// The lock only guards map access and is never held across an await or
/// while a fetcher runs, so completions may re-enter the cache freely.
#[derive(Default)]
pub struct DetailCache {
    slots: Mutex<HashMap<String, Slot>>,
    next_fetch_id: AtomicU64,
}

impl DetailCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached detail for `key`, without fetching.
    pub fn get(&self, key: &str) -> Option<Arc<Detail>> {
        match self.slots.lock().get(key.trim()) {
            Some(Slot::Ready(detail)) => Some(Arc::clone(detail)),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of populated entries; in-flight fetches are not counted.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a detail obtained outside the cache unless the key is already
    /// populated. Returns the entry that ends up cached.
    pub fn insert(&self, key: &str, detail: Detail) -> Result<Arc<Detail>> {
        let key = normalize_key(key)?;
        let mut slots = self.slots.lock();
        if let Some(Slot::Ready(existing)) = slots.get(key) {
            return Ok(Arc::clone(existing));
        }
        let detail = Arc::new(detail);
        slots.insert(key.to_string(), Slot::Ready(Arc::clone(&detail)));
        Ok(detail)
    }

    /// Returns the cached detail for `key`, or runs `fetcher` once and caches
    /// its success. Callers that arrive while a fetch is outstanding share
    /// its outcome. A failure leaves the key vacant so a later call retries.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetcher: F) -> Result<Arc<Detail>>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Detail>> + Send + 'static,
    {
        let key = normalize_key(key)?;
        let (fetch_id, fetch) = match self.lookup(key) {
            Lookup::Hit(detail) => {
                trace!(key, "detail cache hit");
                return Ok(detail);
            }
            Lookup::Joined(fetch_id, fetch) => {
                trace!(key, fetch_id, "joining outstanding detail fetch");
                (fetch_id, fetch)
            }
            Lookup::Miss => {
                // The fetcher runs outside the lock so it may read the cache itself.
                let fetch = fetcher(key.to_string())
                    .map(|outcome| outcome.map(Arc::new))
                    .boxed()
                    .shared();
                self.register(key, fetch)
            }
        };

        let outcome = fetch.await;
        self.settle(key, fetch_id, &outcome);
        outcome
    }

    fn lookup(&self, key: &str) -> Lookup {
        match self.slots.lock().get(key) {
            Some(Slot::Ready(detail)) => Lookup::Hit(Arc::clone(detail)),
            Some(Slot::Pending { fetch_id, fetch }) => Lookup::Joined(*fetch_id, fetch.clone()),
            None => Lookup::Miss,
        }
    }

    fn register(&self, key: &str, fetch: PendingFetch) -> (u64, PendingFetch) {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            // A re-entrant fetcher may already have filled or claimed the slot.
            Some(Slot::Ready(detail)) => {
                let detail = Arc::clone(detail);
                (0, async move { Ok(detail) }.boxed().shared())
            }
            Some(Slot::Pending { fetch_id, fetch }) => (*fetch_id, fetch.clone()),
            None => {
                let fetch_id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(key, fetch_id, "detail cache miss, fetching");
                slots.insert(
                    key.to_string(),
                    Slot::Pending {
                        fetch_id,
                        fetch: fetch.clone(),
                    },
                );
                (fetch_id, fetch)
            }
        }
    }

    fn settle(&self, key: &str, fetch_id: u64, outcome: &Result<Arc<Detail>>) {
        let mut slots = self.slots.lock();
        let owns_slot = matches!(
            slots.get(key),
            Some(Slot::Pending { fetch_id: pending, .. }) if *pending == fetch_id
        );
        if !owns_slot {
            return;
        }
        match outcome {
            Ok(detail) => {
                slots.insert(key.to_string(), Slot::Ready(Arc::clone(detail)));
            }
            Err(_) => {
                slots.remove(key);
            }
        }
    }
}

enum Lookup {
    Hit(Arc<Detail>),
    Joined(u64, PendingFetch),
    Miss,
}

fn normalize_key(key: &str) -> Result<&str> {
    let key = key.trim();
    if key.is_empty() {
        Err(BrowseError::MissingKey)
    } else {
        Ok(key)
    }
}
