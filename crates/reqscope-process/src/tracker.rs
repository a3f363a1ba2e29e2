//! The tracker interface consumed by request-context construction.

use reqscope_context::{ContextExt, ContextKey, ContextRef};

use crate::error::ProcessError;
use crate::types::{ProcessId, ProcessType};

/// Signals the tracker that a process has ended.
pub type FinishFn = Box<dyn FnOnce() + Send>;

/// Key under which a tracked context exposes its own process id.
pub const PID_KEY: ContextKey<ProcessId> = ContextKey::new("reqscope.process.pid");

/// Result of registering a unit of work with a [`ProcessTracker`].
pub struct TrackedContext {
    /// Context derived from the caller's parent, carrying [`PID_KEY`].
    pub context: ContextRef,
    pub pid: ProcessId,
    /// Must be called exactly once when the work ends.
    pub finish: FinishFn,
}

impl std::fmt::Debug for TrackedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedContext")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Tracks live units of work.
pub trait ProcessTracker: Send + Sync {
    /// Register a unit of work derived from `parent`.
    ///
    /// When `cancellable` is true the tracker may cancel the returned context
    /// on request; otherwise it only observes it.
    fn add_typed_context(
        &self,
        parent: ContextRef,
        description: &str,
        kind: ProcessType,
        cancellable: bool,
    ) -> Result<TrackedContext, ProcessError>;
}

/// Process id of the nearest tracked process in `ctx`'s chain.
pub fn process_id_from<C: ContextExt + ?Sized>(ctx: &C) -> Option<ProcessId> {
    ctx.get(&PID_KEY).map(|pid| (*pid).clone())
}
