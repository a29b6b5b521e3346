//
// config.rs
//
// Configuration for graph context caching and preloading
//

use std::time::Duration;

/// Graph context cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphContextConfig {
    /// Quiet period after the last cursor movement before preloading, in milliseconds
    pub preload_debounce_ms: u64,
    /// Whether cursor movement triggers preloading at all
    pub preload_enabled: bool,
    /// Character budget used when the host does not pass one
    pub default_max_chars: usize,
}

impl Default for GraphContextConfig {
    fn default() -> Self {
        Self {
            preload_debounce_ms: 100,
            preload_enabled: true,
            default_max_chars: 4000,
        }
    }
}

impl GraphContextConfig {
    pub fn preload_debounce(&self) -> Duration {
        Duration::from_millis(self.preload_debounce_ms)
    }
}

/// Parse the `graphContext` section of the host's settings object.
///
/// Returns `None` when the section is absent. Unknown keys are ignored and
/// missing keys keep their defaults.
///
/// ```
/// let settings = serde_json::json!({
///     "graphContext": { "preloadDebounceMs": 250, "maxChars": 2000 }
/// });
/// let cfg = graph_context::parse_graph_context_config(&settings).unwrap();
/// assert_eq!(cfg.preload_debounce_ms, 250);
/// assert_eq!(cfg.default_max_chars, 2000);
/// assert!(cfg.preload_enabled);
/// ```
pub fn parse_graph_context_config(settings: &serde_json::Value) -> Option<GraphContextConfig> {
    let section = settings.get("graphContext")?;

    let mut config = GraphContextConfig::default();

    if let Some(v) = section.get("preloadDebounceMs").and_then(|v| v.as_u64()) {
        config.preload_debounce_ms = v;
    }
    if let Some(v) = section.get("preloadEnabled").and_then(|v| v.as_bool()) {
        config.preload_enabled = v;
    }
    if let Some(v) = section.get("maxChars").and_then(|v| v.as_u64()) {
        config.default_max_chars = usize::try_from(v).unwrap_or(usize::MAX);
    }

    log::info!("Graph context configuration loaded from settings:");
    log::info!("  preload_debounce_ms: {}", config.preload_debounce_ms);
    log::info!("  preload_enabled: {}", config.preload_enabled);
    log::info!("  default_max_chars: {}", config.default_max_chars);

    Some(config)
}
