// lib.rs — Graph context cache for completion and chat prompts.
//
// Wraps a language-server query ("fetcher") that returns symbol snippets for
// lines around the cursor. Results are cached per (document, lines, depth),
// preloaded on cursor movement, dropped on any document edit, and superseded
// preloads are cancelled.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod generation;
pub mod graph_cache;
pub mod invalidation;
pub mod orchestrator;
pub mod perf;
pub mod preloader;
pub mod types;
// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use cache::{CacheEntry, CacheStore, FetchOutcome, Lookup};
pub use config::{parse_graph_context_config, GraphContextConfig};
pub use error::GraphContextError;
pub use events::{
    DocumentChanged, EventEmitter, EventSource, Listener, SelectionChanged, Subscription,
};
pub use fetcher::{ContextFetcher, FetchFuture};
pub use graph_cache::GraphContextCache;
pub use perf::CacheStatsSnapshot;
pub use types::{CacheKey, ContextItem, DocumentId, GraphContextItem, LineRange, RecursionDepth};
