//! Explicit resource-reclaim seam.
//!
//! The writer signals this hook after finishing a large write so the host
//! can return memory to the allocator, shrink caches, or nudge whatever
//! process-level reclaim it owns. The pipeline never reclaims anything
//! itself.

pub trait ResourceManager: Send + Sync {
    /// Hint that a large buffer churn just ended. Must be cheap and
    /// non-blocking; implementations decide whether to act.
    fn request_reclaim(&self);
}

/// Default manager that ignores reclaim hints.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopResourceManager;

impl ResourceManager for NoopResourceManager {
    fn request_reclaim(&self) {}
}
