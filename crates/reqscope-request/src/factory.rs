//! Request context construction.

use std::sync::Arc;

use parking_lot::Mutex;
use reqscope_context::ContextRef;
use reqscope_process::{FinishFn, ProcessError, ProcessId, ProcessTracker, ProcessType};
use tracing::debug;

use crate::context::RequestContext;
use crate::store::RequestStore;

/// Create a request context tracked by `tracker`.
///
/// The request is registered as a cancellable [`ProcessType::Request`]. The
/// returned [`RequestFinisher`] must be finished (or dropped) when the
/// request ends; it runs the store's cleanup actions and then tells the
/// tracker the request is over.
pub fn new_request_context(
    tracker: &dyn ProcessTracker,
    parent: ContextRef,
    description: &str,
) -> Result<(Arc<RequestContext>, RequestFinisher), ProcessError> {
    let tracked = tracker.add_typed_context(parent, description, ProcessType::Request, true)?;

    let store = Arc::new(RequestStore::new());
    let ctx = Arc::new(RequestContext::new(tracked.context, store.clone()));
    debug!("Request context created: {} ({})", tracked.pid, description);

    let finisher = RequestFinisher {
        store,
        pid: tracked.pid,
        process_finished: Mutex::new(Some(tracked.finish)),
    };
    Ok((ctx, finisher))
}

/// A request context with no process tracking and no finisher.
///
/// Cleanup actions registered on it never run unless the caller runs them.
pub fn new_request_context_for_test(parent: ContextRef) -> Arc<RequestContext> {
    Arc::new(RequestContext::new(parent, Arc::new(RequestStore::new())))
}

/// Ends a request: runs its cleanup actions, then signals the tracker.
///
/// Only the first [`finish`](Self::finish) has any effect. Dropping an
/// unfinished finisher finishes the request, so holding it across the
/// handler guarantees cleanup on early return, panic or cancellation.
#[must_use = "dropping the finisher ends the request immediately"]
pub struct RequestFinisher {
    store: Arc<RequestStore>,
    pid: ProcessId,
    process_finished: Mutex<Option<FinishFn>>,
}

impl RequestFinisher {
    pub fn pid(&self) -> &ProcessId {
        &self.pid
    }

    pub fn is_finished(&self) -> bool {
        self.process_finished.lock().is_none()
    }

    pub fn finish(&self) {
        let Some(process_finished) = self.process_finished.lock().take() else {
            return;
        };
        self.store.run_cleanup();
        process_finished();
        debug!("Request finished: {}", self.pid);
    }
}

impl Drop for RequestFinisher {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for RequestFinisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestFinisher")
            .field("pid", &self.pid)
            .field("finished", &self.is_finished())
            .finish()
    }
}
