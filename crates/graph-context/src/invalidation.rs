//
// invalidation.rs
//
// Clears the graph context cache on every document edit
//

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::events::DocumentChanged;

/// Any edit anywhere can change the definitions a cached line refers to, so
/// every document change drops the whole cache.
#[derive(Debug)]
pub struct InvalidationListener {
    store: Arc<CacheStore>,
}

impl InvalidationListener {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    pub fn on_document_changed(&self, event: &DocumentChanged) {
        log::trace!(
            "Invalidating graph context cache: {} changed ({} content changes)",
            event.document,
            event.content_changes
        );
        self.invalidate_all();
    }

    pub fn invalidate_all(&self) {
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::ContextFetcher;
    use crate::generation::Generation;
    use crate::test_utils::{test_uri, MockFetcher};
    use crate::types::{CacheKey, LineRange, RecursionDepth};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_unrelated_document_change_clears_everything() {
        let store = Arc::new(CacheStore::new());
        let fetcher = MockFetcher::new();
        let gen = Generation {
            id: 1,
            token: CancellationToken::new(),
        };
        let key = CacheKey::new(test_uri("a.ts"), LineRange::single(2), RecursionDepth::DIRECT);
        store.get_or_create(key.clone(), &gen, |cancel| {
            fetcher.fetch(&key.document, key.range, cancel, key.depth)
        });
        assert!(store.contains(&key));

        let listener = InvalidationListener::new(store.clone());
        listener.on_document_changed(&DocumentChanged {
            document: test_uri("unrelated.ts"),
            content_changes: 0,
        });
        assert!(store.is_empty());

        // Nothing cached: still fine
        listener.on_document_changed(&DocumentChanged {
            document: test_uri("a.ts"),
            content_changes: 1,
        });
        assert!(store.is_empty());
    }
}
