//
// cache.rs
//
// Coalescing store of in-flight and completed fetches
//

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::fetcher::FetchFuture;
use crate::generation::Generation;
use crate::perf::CacheStats;
use crate::types::{CacheKey, ContextItem};

/// Result of a cached fetch. Both arms are cheap to clone so every waiter on
/// a shared future gets the same value.
pub type FetchOutcome = Result<Arc<Vec<ContextItem>>, Arc<anyhow::Error>>;

/// Fetch future that any number of callers can await
pub type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// One cached fetch
#[derive(Clone)]
pub struct CacheEntry {
    future: SharedFetch,
    cancel: CancellationToken,
    generation: u64,
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("generation", &self.generation)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("resolved", &self.future.peek().is_some())
            .finish()
    }
}

impl CacheEntry {
    /// The shared fetch. Stays pending forever if the fetcher abandons a
    /// cancelled request.
    pub fn result(&self) -> SharedFetch {
        self.future.clone()
    }

    /// The outcome, if the fetch has already resolved
    pub fn peek(&self) -> Option<&FetchOutcome> {
        self.future.peek()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Whether a lookup found an existing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
}

/// Key → entry table with total invalidation.
///
/// Unbounded in size; entries only leave the table when the whole table is
/// cleared. Resolved fetches never write back into the table, so an entry
/// dropped by [`CacheStore::clear`] cannot reappear.
#[derive(Default)]
pub struct CacheStore {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    stats: Arc<CacheStats>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats(stats: Arc<CacheStats>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    /// Return the entry for `key`, creating it with `make_fetch` if absent.
    ///
    /// `make_fetch` receives the generation's token and is called with the
    /// table locked; it must not call back into this store. A new fetch is
    /// spawned onto the current tokio runtime so it makes progress even when
    /// nobody awaits it. The background driver stops once the generation's
    /// token is cancelled; callers awaiting the entry keep polling it
    /// themselves.
    pub fn get_or_create<F>(
        &self,
        key: CacheKey,
        generation: &Generation,
        make_fetch: F,
    ) -> (CacheEntry, Lookup)
    where
        F: FnOnce(CancellationToken) -> FetchFuture,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.entry(key) {
            Entry::Occupied(occupied) => {
                log::trace!(
                    "Graph context cache hit for {} (generation {})",
                    occupied.key(),
                    occupied.get().generation
                );
                self.stats.record_hit();
                (occupied.get().clone(), Lookup::Hit)
            }
            Entry::Vacant(vacant) => {
                log::trace!(
                    "Graph context cache miss for {} (generation {})",
                    vacant.key(),
                    generation.id
                );
                self.stats.record_miss();

                let future = make_fetch(generation.token.clone())
                    .map(|result| result.map(Arc::new).map_err(Arc::new))
                    .boxed()
                    .shared();
                drive(future.clone(), generation.token.clone());

                let entry = CacheEntry {
                    future,
                    cancel: generation.token.clone(),
                    generation: generation.id,
                };
                (vacant.insert(entry).clone(), Lookup::Miss)
            }
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Drop every entry. Outstanding fetches keep running but are no longer
    /// reachable through the store.
    pub fn clear(&self) {
        let dropped = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *entries)
        };
        self.stats.record_invalidation();
        if !dropped.is_empty() {
            log::trace!("Cleared {} graph context cache entries", dropped.len());
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Poll `future` in the background when a runtime is available, until it
/// resolves or `cancel` fires
fn drive(future: SharedFetch, cancel: CancellationToken) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::select! {
                    biased;
                    _ = future => {}
                    _ = cancel.cancelled() => {}
                }
            });
        }
        Err(_) => {
            log::warn!("No tokio runtime; graph context fetch will run only when awaited");
        }
    }
}
