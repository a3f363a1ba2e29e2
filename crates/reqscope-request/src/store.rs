//! RequestStore: per-request values and cleanup actions.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard, RwLock};
use reqscope_context::{AnyValue, ContextExt, ContextKey, KeyId};
use tracing::{debug, error, warn};

use crate::close::Close;
use crate::data::ContextData;

type CleanupFn = Box<dyn FnOnce() + Send>;

/// The side-channel state of one request.
///
/// Keyed values sit behind a read/write lock: lookups run concurrently,
/// writes are exclusive. Cleanup actions have their own mutex, since boxed
/// `FnOnce + Send` actions cannot be shared between readers. [`ContextData`]
/// sits behind a third mutex and follows the single-writer convention.
///
/// Once [`run_cleanup`](Self::run_cleanup) has started the store is
/// finished. Writing to a finished store is a caller bug; it is tolerated and
/// logged rather than rejected.
#[derive(Default)]
pub struct RequestStore {
    values: RwLock<HashMap<KeyId, AnyValue>>,
    cleanups: Mutex<Vec<CleanupFn>>,
    /// Set only while `cleanups` is locked, so a registration either lands
    /// in the drained list or sees the flag. Read lock-free by `set_any`.
    finished: AtomicBool,
    data: Mutex<Option<ContextData>>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store of the nearest request context in `ctx`'s chain.
    pub fn from_context<C: ContextExt + ?Sized>(ctx: &C) -> Option<Arc<RequestStore>> {
        ctx.capability_of::<RequestStore>()
    }

    // ── Values ───────────────────────────────────────────────────────────

    /// Typed lookup. `None` when the key was never set.
    pub fn get_value<T: Any + Send + Sync>(&self, key: &ContextKey<T>) -> Option<Arc<T>> {
        self.get_any(&key.id())?.downcast::<T>().ok()
    }

    /// Insert or overwrite. Concurrent writers to the same key: last one wins.
    pub fn set_value<T: Any + Send + Sync>(&self, key: &ContextKey<T>, value: T) {
        self.set_any(key.id(), Arc::new(value));
    }

    /// Like [`set_value`](Self::set_value) for a value that is already shared.
    pub fn set_shared<T: Any + Send + Sync>(&self, key: &ContextKey<T>, value: Arc<T>) {
        self.set_any(key.id(), value);
    }

    /// Untyped lookup; returns the stored handle itself.
    pub fn get_any(&self, key: &KeyId) -> Option<AnyValue> {
        self.values.read().get(key).cloned()
    }

    pub fn set_any(&self, key: KeyId, value: AnyValue) {
        if self.is_finished() {
            debug!("Value '{}' set on a finished request store", key);
        }
        self.values.write().insert(key, value);
    }

    pub fn contains(&self, key: &KeyId) -> bool {
        self.values.read().contains_key(key)
    }

    // ── Data view ────────────────────────────────────────────────────────

    /// The request's [`ContextData`], created on first access.
    ///
    /// Do not call again (or from a nested call) while the returned guard is
    /// alive on the same thread: the second call blocks forever.
    pub fn data(&self) -> MappedMutexGuard<'_, ContextData> {
        MutexGuard::map(self.data.lock(), |data| data.get_or_insert_with(ContextData::new))
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    /// Register an action to run when the request finishes. Actions run in
    /// registration order.
    ///
    /// If the request has already finished the action runs right away.
    pub fn add_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut actions = self.cleanups.lock();
        if self.is_finished() {
            drop(actions);
            warn!("Cleanup registered after request finished; running it now");
            run_guarded(Box::new(cleanup), 0, 1);
            return;
        }
        actions.push(Box::new(cleanup));
    }

    /// Register a resource to be closed when the request finishes. Close
    /// failures are logged and otherwise ignored.
    pub fn add_closer<C: Close>(&self, closer: C) {
        self.add_cleanup(move || {
            if let Err(e) = closer.close() {
                warn!("Failed to close request resource: {e}");
            }
        });
    }

    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.lock().len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Run every registered cleanup action once, in registration order.
    ///
    /// A panicking action is logged and the remaining ones still run. Calling
    /// this again runs nothing.
    pub fn run_cleanup(&self) {
        let cleanups = {
            let mut actions = self.cleanups.lock();
            self.finished.store(true, Ordering::Release);
            std::mem::take(&mut *actions)
        };

        let total = cleanups.len();
        for (index, cleanup) in cleanups.into_iter().enumerate() {
            run_guarded(cleanup, index, total);
        }
        debug!("Request cleanup complete ({} actions)", total);
    }
}

impl std::fmt::Debug for RequestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestStore")
            .field("values", &self.values.read().len())
            .field("cleanups", &self.pending_cleanups())
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn run_guarded(cleanup: CleanupFn, index: usize, total: usize) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
        error!(
            "Request cleanup {}/{} panicked: {}",
            index + 1,
            total,
            panic_message(panic.as_ref())
        );
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Used by [`crate::RequestContext`] to answer capability lookups.
pub(crate) fn store_type_id() -> TypeId {
    TypeId::of::<RequestStore>()
}
