//! The `Context` trait and the root context.

use std::any::{Any, TypeId};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::ContextError;
use crate::key::{ContextKey, KeyId};

/// A shared, type-erased context value.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// Shared handle to any context node.
pub type ContextRef = Arc<dyn Context>;

/// A node in a context chain.
///
/// Implementations that wrap a parent must forward every method they do not
/// own to that parent, including [`Context::capability`]; otherwise lookups
/// stop at the wrapper.
pub trait Context: Send + Sync {
    /// The instant after which the context reports
    /// [`ContextError::DeadlineExceeded`], if any.
    fn deadline(&self) -> Option<Instant>;

    /// Signal that fires when the context is done.
    fn cancellation(&self) -> &CancellationToken;

    /// `None` while the context is active, the termination reason afterwards.
    fn err(&self) -> Option<ContextError>;

    /// Resolve a value by key. Absent keys yield `None`.
    fn value(&self, key: &KeyId) -> Option<AnyValue>;

    /// Resolve a capability by the type that provides it.
    ///
    /// Capabilities live outside the value key space: a node that *is* (or
    /// owns) some service answers for that service's type here.
    fn capability(&self, _type_id: TypeId) -> Option<AnyValue> {
        None
    }
}

/// Typed helpers available on every context.
pub trait ContextExt: Context {
    /// Typed value lookup. A value stored under the key's name with a
    /// different type is not returned.
    fn get<T: Any + Send + Sync>(&self, key: &ContextKey<T>) -> Option<Arc<T>> {
        self.value(&key.id())?.downcast::<T>().ok()
    }

    /// Typed capability lookup.
    fn capability_of<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.capability(TypeId::of::<T>())?.downcast::<T>().ok()
    }

    fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Wait for the cancellation signal.
    ///
    /// Deadlines only fire this future when the context was created inside a
    /// Tokio runtime; [`Context::err`] detects an expired deadline either way.
    fn done(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation().cancelled()
    }
}

impl<C: Context + ?Sized> ContextExt for C {}

/// The root of every chain: never cancelled, no deadline, no values.
#[derive(Debug, Default)]
pub struct Background {
    token: CancellationToken,
}

impl Context for Background {
    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    fn err(&self) -> Option<ContextError> {
        None
    }

    fn value(&self, _key: &KeyId) -> Option<AnyValue> {
        None
    }
}

/// A fresh root context.
pub fn background() -> ContextRef {
    Arc::new(Background::default())
}

impl<C: Context + ?Sized> Context for Arc<C> {
    fn deadline(&self) -> Option<Instant> {
        (**self).deadline()
    }

    fn cancellation(&self) -> &CancellationToken {
        (**self).cancellation()
    }

    fn err(&self) -> Option<ContextError> {
        (**self).err()
    }

    fn value(&self, key: &KeyId) -> Option<AnyValue> {
        (**self).value(key)
    }

    fn capability(&self, type_id: TypeId) -> Option<AnyValue> {
        (**self).capability(type_id)
    }
}
