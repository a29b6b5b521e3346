//
// test_utils/mock_fetcher.rs
//
// Recording fetcher with scripted responses
//

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::fetcher::{ContextFetcher, FetchFuture};
use crate::types::{ContextItem, DocumentId, LineRange, RecursionDepth};

/// One recorded call to [`MockFetcher::fetch`]
#[derive(Debug, Clone)]
pub struct FetchCall {
    pub document: DocumentId,
    pub range: LineRange,
    pub depth: RecursionDepth,
    pub cancel: CancellationToken,
}

/// Fetcher that records every call and answers from a script.
///
/// Unscripted queries resolve to a single item named
/// `sym_<start line>_d<depth>` defined in the queried document. While the
/// fetcher is held, futures wait for [`MockFetcher::release`]; a held query
/// whose token was cancelled in the meantime never resolves.
#[derive(Debug, Default)]
pub struct MockFetcher {
    calls: Mutex<Vec<FetchCall>>,
    responses: Mutex<HashMap<(u32, RecursionDepth), Vec<ContextItem>>>,
    failures: Mutex<HashSet<(u32, RecursionDepth)>>,
    gate: Mutex<Option<CancellationToken>>,
    live: Arc<AtomicUsize>,
}

/// Counts a fetch future as live until it is dropped
struct LiveFetch(Arc<AtomicUsize>);

impl LiveFetch {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(live))
    }
}

impl Drop for LiveFetch {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries starting at `line` with `depth` with `items`
    pub fn respond(&self, line: u32, depth: RecursionDepth, items: Vec<ContextItem>) {
        lock(&self.responses).insert((line, depth), items);
    }

    /// Make queries starting at `line` with `depth` fail
    pub fn fail(&self, line: u32, depth: RecursionDepth) {
        lock(&self.failures).insert((line, depth));
    }

    /// Hold every subsequent fetch until [`MockFetcher::release`]
    pub fn hold_all(&self) {
        let mut gate = lock(&self.gate);
        if gate.is_none() {
            *gate = Some(CancellationToken::new());
        }
    }

    /// Let held fetches resolve
    pub fn release(&self) {
        if let Some(gate) = lock(&self.gate).take() {
            gate.cancel();
        }
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// `(start line, depth)` of each call, in call order
    pub fn call_summary(&self) -> Vec<(u32, RecursionDepth)> {
        lock(&self.calls)
            .iter()
            .map(|call| (call.range.start, call.depth))
            .collect()
    }

    /// Fetch futures not yet dropped, resolved or not
    pub fn live_fetches(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn default_symbol(line: u32, depth: RecursionDepth) -> String {
        format!("sym_{}_d{}", line, depth)
    }
}

impl ContextFetcher for MockFetcher {
    fn fetch(
        &self,
        document: &DocumentId,
        range: LineRange,
        cancel: CancellationToken,
        depth: RecursionDepth,
    ) -> FetchFuture {
        lock(&self.calls).push(FetchCall {
            document: document.clone(),
            range,
            depth,
            cancel: cancel.clone(),
        });

        let key = (range.start, depth);
        let fails = lock(&self.failures).contains(&key);
        let items = lock(&self.responses).get(&key).cloned().unwrap_or_else(|| {
            vec![ContextItem::new(
                Self::default_symbol(range.start, depth),
                vec![format!("line {}", range.start)],
                document.clone(),
            )]
        });
        let gate = lock(&self.gate).clone();
        let live = LiveFetch::new(&self.live);

        async move {
            let _live = live;
            if let Some(gate) = gate {
                gate.cancelled().await;
                if cancel.is_cancelled() {
                    std::future::pending::<()>().await;
                }
            }
            if fails {
                anyhow::bail!("mock fetch failed for line {} depth {}", key.0, key.1);
            }
            Ok(items)
        }
        .boxed()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
