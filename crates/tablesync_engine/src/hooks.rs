//! Application callbacks.

/// Callbacks the controller invokes on notable events.
pub trait SyncHooks: Send + Sync {
    /// Called whenever the server answers 403 for a table.
    fn forbidden(&self, _table: &str) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl SyncHooks for NoopHooks {}
