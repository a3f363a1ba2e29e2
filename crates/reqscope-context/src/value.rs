//! Single key/value context nodes.

use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::context::{AnyValue, Context, ContextRef};
use crate::error::ContextError;
use crate::key::{ContextKey, KeyId};

/// A context carrying one value on top of its parent.
pub struct ValueContext {
    parent: ContextRef,
    key: KeyId,
    value: AnyValue,
}

impl Context for ValueContext {
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
        if *key == self.key {
            return Some(self.value.clone());
        }
        self.parent.value(key)
    }

    fn capability(&self, type_id: TypeId) -> Option<AnyValue> {
        self.parent.capability(type_id)
    }
}

/// Derive a context that resolves `key` to `value`, shadowing any ancestor
/// value under the same key.
pub fn with_value<T: Any + Send + Sync>(
    parent: ContextRef,
    key: &ContextKey<T>,
    value: T,
) -> ContextRef {
    Arc::new(ValueContext {
        parent,
        key: key.id(),
        value: Arc::new(value),
    })
}
