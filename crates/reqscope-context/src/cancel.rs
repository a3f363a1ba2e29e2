//! Cancellation and deadlines.

use std::any::TypeId;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::trace;

use crate::context::{AnyValue, Context, ContextRef};
use crate::error::ContextError;
use crate::key::KeyId;

/// A context that can be cancelled independently of its parent.
///
/// Cancelling the parent cancels this node too; cancelling this node leaves
/// the parent untouched.
pub struct CancelContext {
    parent: ContextRef,
    token: CancellationToken,
    deadline: Option<Instant>,
    cause: OnceLock<ContextError>,
    /// Stops the deadline timer task when this context is dropped.
    _timer: DropGuard,
}

impl CancelContext {
    fn new(parent: ContextRef, own_deadline: Option<Instant>) -> Arc<Self> {
        let token = parent.cancellation().child_token();
        let deadline = match (parent.deadline(), own_deadline) {
            (Some(inherited), Some(own)) => Some(inherited.min(own)),
            (inherited, own) => inherited.or(own),
        };

        let timer_stop = CancellationToken::new();
        let ctx = Arc::new(Self {
            parent,
            token,
            deadline,
            cause: OnceLock::new(),
            _timer: timer_stop.clone().drop_guard(),
        });

        if let Some(at) = own_deadline {
            if at <= Instant::now() {
                ctx.cancel_with(ContextError::DeadlineExceeded);
            } else {
                spawn_deadline_timer(Arc::downgrade(&ctx), at, timer_stop);
            }
        }

        ctx
    }

    fn cancel_with(&self, cause: ContextError) {
        // First cause wins.
        let _ = self.cause.set(cause);
        self.token.cancel();
    }
}

fn spawn_deadline_timer(ctx: Weak<CancelContext>, at: Instant, stop: CancellationToken) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        trace!("no tokio runtime; deadline will be detected lazily");
        return;
    };
    let Some(token) = ctx.upgrade().map(|c| c.token.clone()) else {
        return;
    };

    handle.spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(at)) => {
                if let Some(ctx) = ctx.upgrade() {
                    ctx.cancel_with(ContextError::DeadlineExceeded);
                }
            }
            _ = token.cancelled() => {}
            _ = stop.cancelled() => {}
        }
    });
}

impl Context for CancelContext {
    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    fn err(&self) -> Option<ContextError> {
        if let Some(cause) = self.cause.get() {
            return Some(*cause);
        }
        if self.token.is_cancelled() {
            return Some(self.parent.err().unwrap_or(ContextError::Cancelled));
        }
        if let Some(at) = self.deadline {
            if Instant::now() >= at {
                self.cancel_with(ContextError::DeadlineExceeded);
                return Some(ContextError::DeadlineExceeded);
            }
        }
        None
    }

    fn value(&self, key: &KeyId) -> Option<AnyValue> {
        self.parent.value(key)
    }

    fn capability(&self, type_id: TypeId) -> Option<AnyValue> {
        self.parent.capability(type_id)
    }
}

/// Cancels the [`CancelContext`] it was created with.
#[derive(Clone)]
pub struct CancelHandle {
    ctx: Arc<CancelContext>,
}

impl CancelHandle {
    /// Cancel the context. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.ctx.cancel_with(ContextError::Cancelled);
    }

    pub fn is_cancelled(&self) -> bool {
        self.ctx.token.is_cancelled()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Derive a context that is cancelled by the returned handle.
pub fn with_cancel(parent: ContextRef) -> (ContextRef, CancelHandle) {
    let ctx = CancelContext::new(parent, None);
    let handle = CancelHandle { ctx: ctx.clone() };
    (ctx as ContextRef, handle)
}

/// Derive a context that ends no later than `at`.
///
/// A parent deadline earlier than `at` still applies.
pub fn with_deadline(parent: ContextRef, at: Instant) -> (ContextRef, CancelHandle) {
    let ctx = CancelContext::new(parent, Some(at));
    let handle = CancelHandle { ctx: ctx.clone() };
    (ctx as ContextRef, handle)
}

pub fn with_timeout(parent: ContextRef, timeout: Duration) -> (ContextRef, CancelHandle) {
    with_deadline(parent, Instant::now() + timeout)
}
