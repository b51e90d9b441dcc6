//! Copy-on-write JSON value tree.
//!
//! A [`ValueTree`] is cheap to clone: clones share the same underlying
//! `serde_json::Value` until one of them is mutated, at which point only the
//! mutated handle receives a private copy. Workflow steps can therefore hand
//! the same request body or step output to several consumers without any of
//! them observing another's edits.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

#[derive(Clone, PartialEq, Default)]
pub struct ValueTree(Arc<Value>);

impl ValueTree {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn is_object(&self) -> bool {
        self.0.is_object()
    }

    /// Returns the named top-level property as its own tree.
    pub fn property(&self, key: &str) -> Option<ValueTree> {
        self.0.get(key).cloned().map(ValueTree::new)
    }

    /// Splits an array tree into one tree per element, preserving order.
    pub fn elements(&self) -> Option<Vec<ValueTree>> {
        self.0
            .as_array()
            .map(|items| items.iter().cloned().map(ValueTree::new).collect())
    }

    /// Navigates a path of object keys and array indices.
    ///
    /// Numeric segments index into arrays; on objects every segment is a key.
    pub fn navigate<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        navigate(&self.0, path)
    }

    /// Sets a top-level property, copying the tree first if it is shared.
    ///
    /// Returns `false` (and leaves the tree untouched) when the tree is not an object.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) -> bool {
        if !self.0.is_object() {
            return false;
        }
        match Arc::make_mut(&mut self.0) {
            Value::Object(map) => {
                map.insert(key.into(), value);
                true
            }
            _ => false,
        }
    }
}

/// Navigates `value` along `path`; see [`ValueTree::navigate`].
pub fn navigate<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| {
        let segment = segment.as_ref();
        match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

impl From<Value> for ValueTree {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for ValueTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ValueTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl Serialize for ValueTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ValueTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ValueTree::new)
    }
}
