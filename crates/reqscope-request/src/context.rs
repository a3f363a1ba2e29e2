//! RequestContext: a context node backed by a request store.

use std::any::TypeId;
use std::sync::Arc;
use std::time::Instant;

use reqscope_context::{AnyValue, CancellationToken, Context, ContextError, ContextRef, KeyId};

use crate::store::{RequestStore, store_type_id};

/// Decorates a parent context with a [`RequestStore`].
///
/// Deadline, cancellation and error come from the parent unchanged. Value
/// lookups consult the store first and fall back to the parent, so values
/// set for this request shadow anything set further up the chain.
pub struct RequestContext {
    parent: ContextRef,
    store: Arc<RequestStore>,
}

impl RequestContext {
    pub fn new(parent: ContextRef, store: Arc<RequestStore>) -> Self {
        Self { parent, store }
    }

    pub fn store(&self) -> &Arc<RequestStore> {
        &self.store
    }
}

impl Context for RequestContext {
    fn deadline(&self) -> Option<Instant> {
        self.parent.deadline()
    }

    fn cancellation(&self) -> &CancellationToken {
        self.parent.cancellation()
    }

    fn err(&self) -> Option<ContextError> {
        self.parent.err()
    }

    fn value(&self, key: &KeyId) -> Option<AnyValue> {
        self.store.get_any(key).or_else(|| self.parent.value(key))
    }

    fn capability(&self, type_id: TypeId) -> Option<AnyValue> {
        if type_id == store_type_id() {
            return Some(self.store.clone() as AnyValue);
        }
        self.parent.capability(type_id)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("store", &self.store)
            .field("done", &self.parent.err().is_some())
            .finish()
    }
}
