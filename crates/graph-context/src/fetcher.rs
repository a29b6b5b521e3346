//
// fetcher.rs
//
// Boundary to the language-server query that produces graph context
//

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::types::{ContextItem, DocumentId, LineRange, RecursionDepth};

/// Future returned by a fetcher
pub type FetchFuture = BoxFuture<'static, anyhow::Result<Vec<ContextItem>>>;

/// Source of graph context for a range of lines.
///
/// `fetch` must return without doing the query inline; all work happens when
/// the returned future is polled. Cancellation is advisory: once `cancel`
/// fires an implementation may stop early and either return an error or
/// never resolve at all. Callers never assume termination.
pub trait ContextFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        document: &DocumentId,
        range: LineRange,
        cancel: CancellationToken,
        depth: RecursionDepth,
    ) -> FetchFuture;
}

impl<F> ContextFetcher for F
where
    F: Fn(&DocumentId, LineRange, CancellationToken, RecursionDepth) -> FetchFuture
        + Send
        + Sync
        + 'static,
{
    fn fetch(
        &self,
        document: &DocumentId,
        range: LineRange,
        cancel: CancellationToken,
        depth: RecursionDepth,
    ) -> FetchFuture {
        self(document, range, cancel, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tower_lsp::lsp_types::Url;

    #[tokio::test]
    async fn test_closure_is_a_fetcher() {
        let fetcher = |doc: &DocumentId,
                       range: LineRange,
                       _cancel: CancellationToken,
                       depth: RecursionDepth|
         -> FetchFuture {
            let item = ContextItem::new(format!("{}:{}", range, depth), vec![], doc.clone());
            async move { Ok(vec![item]) }.boxed()
        };
        let uri = Url::parse("file:///a.ts").unwrap();
        let items = ContextFetcher::fetch(
            &fetcher,
            &uri,
            LineRange::single(2),
            CancellationToken::new(),
            RecursionDepth::ONE_HOP,
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].symbol_name, "2..3:1");
    }
}
