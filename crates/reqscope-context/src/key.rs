//! Typed context keys.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;

/// Runtime identity of a [`ContextKey`]: its name plus the value type.
///
/// Two keys with the same name but different value types never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId {
    name: &'static str,
    type_id: TypeId,
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A key whose values are of type `T`.
///
/// Identity is the name plus `T`, so two keys with the same name and value
/// type share a slot. Library keys should be namespaced with a dotted
/// crate/module prefix; short names are for application code.
///
/// Declare keys as constants next to the code that owns the value:
///
/// ```
/// use reqscope_context::ContextKey;
///
/// const USER: ContextKey<String> = ContextKey::new("myapp.auth.user");
/// assert_eq!(USER.name(), "myapp.auth.user");
/// ```
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ContextKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> KeyId {
        KeyId {
            name: self.name,
            type_id: TypeId::of::<T>(),
        }
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextKey")
            .field("name", &self.name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
