use serde::{Deserialize, Serialize};
use std::fmt;

pub const NULL_REFERENCE: i64 = -1;

/// Opaque handle to an object living outside the preset, usually an asset key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(String);

impl ObjectHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectHandle {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Ordered table that reference leaves index into.
///
/// Within one capture pass a handle is appended on first sight and every later
/// occurrence reuses that index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectReferences {
    handles: Vec<ObjectHandle>,
}

impl ObjectReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_handles(handles: Vec<ObjectHandle>) -> Self {
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    pub fn handles(&self) -> &[ObjectHandle] {
        &self.handles
    }

    /// Index for `handle`, or [`NULL_REFERENCE`] when there is none.
    pub fn encode(&mut self, handle: Option<&ObjectHandle>) -> i64 {
        match handle {
            Some(handle) => self.find_or_append(handle) as i64,
            None => NULL_REFERENCE,
        }
    }

    pub fn find_or_append(&mut self, handle: &ObjectHandle) -> usize {
        if let Some(index) = self.handles.iter().position(|existing| existing == handle) {
            return index;
        }
        self.handles.push(handle.clone());
        self.handles.len() - 1
    }

    /// Negative and out-of-range indices resolve to no object.
    pub fn resolve(&self, index: i64) -> Option<&ObjectHandle> {
        usize::try_from(index).ok().and_then(|index| self.handles.get(index))
    }

    pub fn is_valid_index(&self, index: i64) -> bool {
        index == NULL_REFERENCE || self.resolve(index).is_some()
    }
}
