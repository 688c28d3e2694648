//! The spy contract.
//!
//! The spy is the interception mechanism that creates an observer at call
//! entry and destroys it at call exit. It lives outside this crate; all the
//! engine needs from it is the capture policy, read once at observer
//! construction, and an identity to hang diagnostics on.

use std::sync::Arc;

use optic_arena::ArenaConfig;

use crate::config::CaptureConfig;

/// Policy source for call observers.
///
/// One spy is shared by every thread executing intercepted calls, so
/// implementations must be thread-safe; observers themselves never are.
pub trait Spy: Send + Sync + std::fmt::Debug {
    /// Whether application-owned memory ranges should be tracked.
    fn observe_application_pool(&self) -> bool;

    /// Scratch arena settings for new observers.
    fn arena_config(&self) -> ArenaConfig {
        ArenaConfig::default()
    }
}

/// Stock [`Spy`] implementation backed by a [`CaptureConfig`].
#[derive(Debug, Default)]
pub struct CapturePolicy {
    config: CaptureConfig,
}

impl CapturePolicy {
    /// Create a policy from a configuration.
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Create a policy with default configuration, ready to share.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The underlying configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

impl Spy for CapturePolicy {
    fn observe_application_pool(&self) -> bool {
        self.config.observe_application_pool
    }

    fn arena_config(&self) -> ArenaConfig {
        self.config.arena.clone()
    }
}
