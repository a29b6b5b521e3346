//! Shared test utilities for unit tests and integration tests.
//!
//! Available in `#[cfg(test)]` builds and when the `test-support` feature is
//! enabled.

pub mod mock_fetcher;

pub use mock_fetcher::{FetchCall, MockFetcher};

use tower_lsp::lsp_types::Url;

/// `file:///<name>` URI for fixtures
pub fn test_uri(name: &str) -> Url {
    Url::parse(&format!("file:///{}", name)).expect("valid test URI")
}
