//! ContextData: the string-keyed data view of a request.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat string → JSON value mapping, typically handed to a template renderer.
///
/// Not synchronized: one logical owner (normally the request handler)
/// mutates it at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextData(HashMap<String, Value>);

impl ContextData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every entry of `other` into `self`; `other` wins on collisions.
    pub fn merge_from(&mut self, other: ContextData) -> &mut Self {
        self.0.extend(other.0);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }
}

impl Deref for ContextData {
    type Target = HashMap<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ContextData {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<HashMap<String, Value>> for ContextData {
    fn from(map: HashMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for ContextData {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
