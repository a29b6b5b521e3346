//
// error.rs
//

use thiserror::Error;

/// Errors surfaced to callers of the graph context cache.
///
/// Fetch failures are not represented here: they degrade to empty context
/// for the affected sub-query.
#[derive(Debug, Error)]
pub enum GraphContextError {
    #[error("graph context cache has been disposed")]
    Disposed,
}
