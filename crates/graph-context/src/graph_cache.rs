//
// graph_cache.rs
//
// Public handle wiring the cache, preloader and invalidation together
//

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{Position, Url};

use crate::cache::CacheStore;
use crate::config::GraphContextConfig;
use crate::error::GraphContextError;
use crate::events::{DocumentChanged, EventSource, SelectionChanged, Subscription};
use crate::fetcher::ContextFetcher;
use crate::generation::PreloadGenerations;
use crate::invalidation::InvalidationListener;
use crate::orchestrator::QueryOrchestrator;
use crate::perf::{CacheStats, CacheStatsSnapshot, QueryTimer};
use crate::preloader::Preloader;
use crate::types::GraphContextItem;

/// Foreground queries slower than this are reported in verbose perf mode
const QUERY_WARN_THRESHOLD_MS: u64 = 50;

/// Graph context cache for one editor session.
///
/// Subscribes to cursor movement (to preload) and document changes (to
/// invalidate) on construction. Disposal, explicit or on drop, cancels
/// in-flight preloads, stops the debounce timer, detaches both listeners and
/// empties the cache.
pub struct GraphContextCache {
    config: GraphContextConfig,
    store: Arc<CacheStore>,
    orchestrator: Arc<QueryOrchestrator>,
    preloader: Arc<Preloader>,
    invalidation: Arc<InvalidationListener>,
    generations: Arc<PreloadGenerations>,
    stats: Arc<CacheStats>,
    subscriptions: Mutex<Vec<Subscription>>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for GraphContextCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphContextCache")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl GraphContextCache {
    pub fn new(
        config: GraphContextConfig,
        fetcher: Arc<dyn ContextFetcher>,
        selection_events: &dyn EventSource<SelectionChanged>,
        document_events: &dyn EventSource<DocumentChanged>,
    ) -> Self {
        let lifecycle = CancellationToken::new();
        let stats = Arc::new(CacheStats::new());
        let store = Arc::new(CacheStore::with_stats(stats.clone()));
        let generations = Arc::new(PreloadGenerations::new(lifecycle.clone()));
        let orchestrator = Arc::new(QueryOrchestrator::new(
            store.clone(),
            fetcher,
            generations.clone(),
        ));
        let preloader = Arc::new(Preloader::new(
            orchestrator.clone(),
            generations.clone(),
            stats.clone(),
            config.preload_debounce(),
            config.preload_enabled,
            lifecycle,
        ));
        let invalidation = Arc::new(InvalidationListener::new(store.clone()));

        // Listeners hold weak references so an undisposed emitter never keeps
        // the cache alive.
        let weak_preloader = Arc::downgrade(&preloader);
        let selection_subscription =
            selection_events.subscribe(Arc::new(move |event: &SelectionChanged| {
                if let Some(preloader) = weak_preloader.upgrade() {
                    preloader.on_selection_changed(event);
                }
            }));
        let weak_invalidation = Arc::downgrade(&invalidation);
        let document_subscription =
            document_events.subscribe(Arc::new(move |event: &DocumentChanged| {
                if let Some(invalidation) = weak_invalidation.upgrade() {
                    invalidation.on_document_changed(event);
                }
            }));

        log::debug!(
            "Graph context cache created (preload {}, debounce {}ms)",
            if config.preload_enabled { "on" } else { "off" },
            config.preload_debounce_ms
        );

        Self {
            config,
            store,
            orchestrator,
            preloader,
            invalidation,
            generations,
            stats,
            subscriptions: Mutex::new(vec![selection_subscription, document_subscription]),
            disposed: AtomicBool::new(false),
        }
    }

    /// Graph context for the cursor line and the line above it.
    ///
    /// Served from cache when possible; otherwise the missing queries are
    /// fetched and cached. Fails only after [`GraphContextCache::dispose`].
    pub async fn get_context_at_position(
        &self,
        document: &Url,
        position: Position,
        max_chars: usize,
    ) -> Result<Vec<GraphContextItem>, GraphContextError> {
        if self.is_disposed() {
            return Err(GraphContextError::Disposed);
        }
        let mut timer = QueryTimer::start(position.line, &self.stats, QUERY_WARN_THRESHOLD_MS);
        let items = self
            .orchestrator
            .get_context_at_position(document, position, max_chars)
            .await;
        timer.finish(items.len());
        Ok(items)
    }

    /// [`GraphContextCache::get_context_at_position`] with the configured budget
    pub async fn get_context(
        &self,
        document: &Url,
        position: Position,
    ) -> Result<Vec<GraphContextItem>, GraphContextError> {
        self.get_context_at_position(document, position, self.config.default_max_chars)
            .await
    }

    /// Drop every cached fetch, as a document edit would
    pub fn invalidate(&self) {
        self.invalidation.invalidate_all();
    }

    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.generations.cancel_all();
        self.preloader.cancel_pending();
        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for mut subscription in subscriptions {
            subscription.unsubscribe();
        }
        self.store.clear();
        log::debug!("Graph context cache disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &GraphContextConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of cached (in-flight or resolved) fetches
    pub fn cached_entries(&self) -> usize {
        self.store.len()
    }
}

impl Drop for GraphContextCache {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventEmitter;
    use crate::test_utils::{test_uri, MockFetcher};

    fn setup() -> (
        GraphContextCache,
        Arc<MockFetcher>,
        EventEmitter<SelectionChanged>,
        EventEmitter<DocumentChanged>,
    ) {
        let fetcher = Arc::new(MockFetcher::new());
        let selections = EventEmitter::new();
        let documents = EventEmitter::new();
        let cache = GraphContextCache::new(
            GraphContextConfig::default(),
            fetcher.clone(),
            &selections,
            &documents,
        );
        (cache, fetcher, selections, documents)
    }

    #[tokio::test]
    async fn test_dispose_fails_fast() {
        let (cache, fetcher, _selections, _documents) = setup();
        cache.dispose();
        let result = cache
            .get_context_at_position(&test_uri("a.ts"), Position::new(1, 0), 100)
            .await;
        assert!(matches!(result, Err(GraphContextError::Disposed)));
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_dispose_unsubscribes_and_is_idempotent() {
        let (cache, _fetcher, selections, documents) = setup();
        assert_eq!(selections.listener_count(), 1);
        assert_eq!(documents.listener_count(), 1);

        cache.dispose();
        cache.dispose();
        assert!(cache.is_disposed());
        assert_eq!(selections.listener_count(), 0);
        assert_eq!(documents.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_disposes() {
        let (cache, _fetcher, selections, documents) = setup();
        drop(cache);
        assert_eq!(selections.listener_count(), 0);
        assert_eq!(documents.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_dispose_cancels_live_generation_and_clears() {
        let (cache, fetcher, _selections, _documents) = setup();
        fetcher.hold_all();
        let doc = test_uri("a.ts");
        let generation = cache.preloader.fire(&doc, Position::new(3, 0)).unwrap();
        assert_eq!(cache.cached_entries(), 2);

        cache.dispose();
        assert!(generation.token.is_cancelled());
        assert!(fetcher.calls().iter().all(|call| call.cancel.is_cancelled()));
        assert_eq!(cache.cached_entries(), 0);
    }

    #[tokio::test]
    async fn test_preload_after_dispose_issues_no_fetch() {
        let (cache, fetcher, _selections, _documents) = setup();
        cache.dispose();

        let fired = cache.preloader.fire(&test_uri("a.ts"), Position::new(3, 0));
        assert!(fired.is_none());
        assert_eq!(fetcher.call_count(), 0);
        assert_eq!(cache.cached_entries(), 0);
        assert_eq!(cache.stats().preload_generations, 0);
    }

    #[tokio::test]
    async fn test_get_context_uses_configured_budget() {
        let fetcher = Arc::new(MockFetcher::new());
        let selections = EventEmitter::new();
        let documents = EventEmitter::new();
        let config = GraphContextConfig {
            default_max_chars: 6,
            ..GraphContextConfig::default()
        };
        let cache = GraphContextCache::new(config, fetcher, &selections, &documents);

        // Each default item is "line N" (6 chars): only the first fits
        let items = cache
            .get_context(&test_uri("a.ts"), Position::new(4, 0))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].symbol, MockFetcher::default_symbol(3, crate::RecursionDepth::DIRECT));
    }
}
