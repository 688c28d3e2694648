//! Capture configuration.

use serde::{Deserialize, Serialize};

use optic_arena::ArenaConfig;

/// Configuration for per-call capture behavior.
///
/// Fixed for the lifetime of each observer: the spy hands the settings to
/// [`CallObserver::new`](crate::observer::CallObserver::new) at call entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Whether ranges in application-owned memory are tracked at all.
    ///
    /// When disabled, reads and writes of application pools are never
    /// recorded; interceptor-owned memory is never recorded regardless,
    /// since the instrumented program cannot see it.
    pub observe_application_pool: bool,

    /// Scratch arena settings for each observer.
    pub arena: ArenaConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            observe_application_pool: true,
            arena: ArenaConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable application-pool observation.
    pub fn with_observe_application_pool(mut self, enabled: bool) -> Self {
        self.observe_application_pool = enabled;
        self
    }

    /// Set the scratch arena configuration.
    pub fn with_arena(mut self, arena: ArenaConfig) -> Self {
        self.arena = arena;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CaptureConfig::default();
        assert!(config.observe_application_pool);
        assert!(config.arena.max_bytes.is_none());
    }

    #[test]
    fn test_builder() {
        let config = CaptureConfig::new()
            .with_observe_application_pool(false)
            .with_arena(ArenaConfig::new().with_chunk_size(4096));
        assert!(!config.observe_application_pool);
        assert_eq!(config.arena.chunk_size, 4096);
    }
}
