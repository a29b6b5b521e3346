//
// generation.rs
//
// Preload generations: one shared cancellation token per preload cycle
//

use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

/// A generation stamp together with the token its fetches observe
#[derive(Debug, Clone)]
pub struct Generation {
    pub id: u64,
    pub token: CancellationToken,
}

/// Tracks the current preload generation.
///
/// Every generation token is a child of the lifecycle root, so cancelling the
/// root (on disposal) cancels whatever generation is live.
#[derive(Debug)]
pub struct PreloadGenerations {
    root: CancellationToken,
    current: Mutex<Generation>,
}

impl PreloadGenerations {
    pub fn new(root: CancellationToken) -> Self {
        let current = Generation {
            id: 0,
            token: root.child_token(),
        };
        Self {
            root,
            current: Mutex::new(current),
        }
    }

    pub fn current(&self) -> Generation {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start generation N+1, cancelling generation N before returning.
    pub fn advance(&self) -> Generation {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.token.cancel();
        let next = Generation {
            id: current.id + 1,
            token: self.root.child_token(),
        };
        log::trace!(
            "Preload generation {} superseded by {}",
            current.id,
            next.id
        );
        *current = next.clone();
        next
    }

    /// Stamp for lookups issued outside a preload cycle.
    ///
    /// Carries the current generation id but a token that only the lifecycle
    /// root can cancel, so cursor movement never cancels a foreground fetch.
    pub fn foreground(&self) -> Generation {
        Generation {
            id: self.current().id,
            token: self.root.clone(),
        }
    }

    /// Cancel the root and with it every generation
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_cancels_previous() {
        let generations = PreloadGenerations::new(CancellationToken::new());
        let first = generations.advance();
        assert_eq!(first.id, 1);
        assert!(!first.token.is_cancelled());

        let second = generations.advance();
        assert_eq!(second.id, 2);
        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());
        assert_eq!(generations.current().id, 2);
    }

    #[test]
    fn test_foreground_survives_advance() {
        let generations = PreloadGenerations::new(CancellationToken::new());
        generations.advance();
        let fg = generations.foreground();
        assert_eq!(fg.id, 1);

        generations.advance();
        assert!(!fg.token.is_cancelled());
    }

    #[test]
    fn test_cancel_all_reaches_current_and_foreground() {
        let generations = PreloadGenerations::new(CancellationToken::new());
        let live = generations.advance();
        let fg = generations.foreground();

        generations.cancel_all();
        assert!(live.token.is_cancelled());
        assert!(fg.token.is_cancelled());
        assert!(generations.is_cancelled());
    }
}
