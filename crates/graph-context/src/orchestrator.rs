//
// orchestrator.rs
//
// Turns a cursor position into cached fetcher queries and merges their results
//

use std::sync::Arc;

use indexmap::IndexMap;
use tower_lsp::lsp_types::{Position, Url};

use crate::cache::{CacheEntry, CacheStore, Lookup};
use crate::fetcher::ContextFetcher;
use crate::generation::{Generation, PreloadGenerations};
use crate::types::{
    CacheKey, ContextItem, DocumentId, GraphContextItem, LineRange, RecursionDepth,
};

/// Depth used for the line above the cursor
pub const PREVIOUS_LINE_DEPTH: RecursionDepth = RecursionDepth::DIRECT;

/// Depth used for the cursor line; the line being edited gets one extra hop
pub const CURRENT_LINE_DEPTH: RecursionDepth = RecursionDepth::ONE_HOP;

/// The keys queried together for one cursor position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    /// Line above the cursor; `None` on the first line
    pub previous: Option<CacheKey>,
    pub current: CacheKey,
}

impl QueryPlan {
    pub fn for_position(document: &DocumentId, position: Position) -> Self {
        let current_range = LineRange::single(position.line);
        let previous = current_range
            .previous_line()
            .map(|range| CacheKey::new(document.clone(), range, PREVIOUS_LINE_DEPTH));
        Self {
            previous,
            current: CacheKey::new(document.clone(), current_range, CURRENT_LINE_DEPTH),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.previous.iter().chain(std::iter::once(&self.current))
    }
}

/// Entries resolved for a [`QueryPlan`]
#[derive(Debug, Clone)]
pub struct PlannedEntries {
    pub previous: Option<CacheEntry>,
    pub current: CacheEntry,
}

pub struct QueryOrchestrator {
    store: Arc<CacheStore>,
    fetcher: Arc<dyn ContextFetcher>,
    generations: Arc<PreloadGenerations>,
}

impl std::fmt::Debug for QueryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl QueryOrchestrator {
    pub fn new(
        store: Arc<CacheStore>,
        fetcher: Arc<dyn ContextFetcher>,
        generations: Arc<PreloadGenerations>,
    ) -> Self {
        Self {
            store,
            fetcher,
            generations,
        }
    }

    /// Look up (or start) every fetch in `plan` under `generation`.
    ///
    /// The previous-line lookup is issued before the current-line lookup.
    pub fn lookup(&self, plan: &QueryPlan, generation: &Generation) -> PlannedEntries {
        let previous = plan
            .previous
            .as_ref()
            .map(|key| self.lookup_key(key, generation));
        let current = self.lookup_key(&plan.current, generation);
        PlannedEntries { previous, current }
    }

    fn lookup_key(&self, key: &CacheKey, generation: &Generation) -> CacheEntry {
        let fetcher = &self.fetcher;
        let (entry, lookup) = self.store.get_or_create(key.clone(), generation, |cancel| {
            fetcher.fetch(&key.document, key.range, cancel, key.depth)
        });
        if lookup == Lookup::Miss {
            log::trace!("Issued graph context fetch for {}", key);
        }
        entry
    }

    /// Warm the cache for `position` without waiting on the results
    pub fn preload(&self, document: &DocumentId, position: Position, generation: &Generation) {
        let plan = QueryPlan::for_position(document, position);
        self.lookup(&plan, generation);
    }

    /// Graph context for the lines at and above `position`, limited to
    /// `max_chars` characters of content.
    pub async fn get_context_at_position(
        &self,
        document: &Url,
        position: Position,
        max_chars: usize,
    ) -> Vec<GraphContextItem> {
        let plan = QueryPlan::for_position(document, position);
        let entries = self.lookup(&plan, &self.generations.foreground());

        let (previous, current) = futures::join!(
            self.resolve(entries.previous),
            self.resolve(Some(entries.current))
        );

        let merged = merge_context(&previous, &current);
        apply_char_budget(&merged, max_chars)
            .into_iter()
            .map(GraphContextItem::from)
            .collect()
    }

    async fn resolve(&self, entry: Option<CacheEntry>) -> Arc<Vec<ContextItem>> {
        let Some(entry) = entry else {
            return Arc::default();
        };
        match entry.result().await {
            Ok(items) => items,
            Err(err) => {
                self.store.stats().record_fetch_failure();
                log::warn!("Graph context fetch failed: {:#}", err);
                Arc::default()
            }
        }
    }
}

/// Concatenate `previous` and `current`, keeping the first item for each
/// `(symbol, source)` pair.
pub fn merge_context(previous: &[ContextItem], current: &[ContextItem]) -> Vec<ContextItem> {
    let mut seen: IndexMap<(&str, &Url), &ContextItem> = IndexMap::new();
    for item in previous.iter().chain(current) {
        seen.entry((item.symbol_name.as_str(), &item.source_uri))
            .or_insert(item);
    }
    seen.into_values().cloned().collect()
}

/// Longest prefix of `items` whose total content length fits in `max_chars`
pub fn apply_char_budget(items: &[ContextItem], max_chars: usize) -> Vec<&ContextItem> {
    let mut used = 0usize;
    let mut kept = Vec::new();
    for item in items {
        let len = item.content_chars();
        if used + len > max_chars {
            break;
        }
        used += len;
        kept.push(item);
    }
    kept
}
