//
// preloader.rs
//
// Debounced cache warming on cursor movement
//

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Position;

use crate::events::SelectionChanged;
use crate::generation::{Generation, PreloadGenerations};
use crate::orchestrator::QueryOrchestrator;
use crate::perf::CacheStats;
use crate::types::DocumentId;

/// Restarts a quiet-period timer on every cursor movement and, once the
/// cursor settles, starts a new preload generation for the final position.
pub struct Preloader {
    orchestrator: Arc<QueryOrchestrator>,
    generations: Arc<PreloadGenerations>,
    stats: Arc<CacheStats>,
    debounce: Duration,
    enabled: bool,
    /// Token of the pending debounce timer, if any
    pending: Mutex<Option<CancellationToken>>,
    lifecycle: CancellationToken,
}

impl std::fmt::Debug for Preloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preloader")
            .field("debounce", &self.debounce)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl Preloader {
    pub fn new(
        orchestrator: Arc<QueryOrchestrator>,
        generations: Arc<PreloadGenerations>,
        stats: Arc<CacheStats>,
        debounce: Duration,
        enabled: bool,
        lifecycle: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            generations,
            stats,
            debounce,
            enabled,
            pending: Mutex::new(None),
            lifecycle,
        }
    }

    /// Handle a cursor notification by (re)starting the debounce timer
    pub fn on_selection_changed(self: &Arc<Self>, event: &SelectionChanged) {
        if !self.enabled || self.lifecycle.is_cancelled() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::warn!("No tokio runtime; skipping graph context preload");
            return;
        };

        let token = self.restart_timer();
        let this = Arc::clone(self);
        let document = event.document.clone();
        let position = event.position;
        let debounce = self.debounce;

        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => { return; }
                _ = tokio::time::sleep(debounce) => {}
            }
            if !this.complete_timer(&token) {
                return;
            }
            this.fire(&document, position);
        });
    }

    /// Clear the pending slot for an elapsed timer. Returns `false` if the
    /// timer was superseded or cancelled while it slept.
    fn complete_timer(&self, token: &CancellationToken) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            return false;
        }
        pending.take();
        true
    }

    /// Cancel the pending timer and install a fresh one
    fn restart_timer(&self) -> CancellationToken {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = pending.take() {
            old.cancel();
        }
        let token = self.lifecycle.child_token();
        *pending = Some(token.clone());
        token
    }

    /// Start a new generation and warm the cache for `position`.
    ///
    /// The previous generation is cancelled before any new fetch is issued.
    /// Returns `None` once the cache has been disposed.
    pub fn fire(&self, document: &DocumentId, position: Position) -> Option<Generation> {
        if self.lifecycle.is_cancelled() {
            log::trace!("Skipping graph context preload for {}: disposed", document);
            return None;
        }
        let generation = self.generations.advance();
        self.stats.record_preload_generation();
        log::trace!(
            "Preloading graph context for {}:{} (generation {})",
            document,
            position.line,
            generation.id
        );
        self.orchestrator.preload(document, position, &generation);
        Some(generation)
    }

    /// Cancel the pending debounce timer without starting a generation
    pub fn cancel_pending(&self) {
        if let Some(token) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}
