//! Set algebra behind choosing which fields a preset records.
//!
//! An included set always contains every ancestor of a nested path, which is
//! also what [`KeyPathStore::nested_keys`] reports, so the set derived from a
//! store compares equal to the set that produced it.

use crate::key_path::KeyPathStore;
use crate::reflect::{FieldKind, PresetTarget, TypeRegistry};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludedPaths {
    paths: BTreeSet<String>,
}

impl IncludedPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of the modified paths and all of their ancestors.
    pub fn from_modifications<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let mut included = Self::new();
        for path in paths {
            included.insert(path.as_ref());
        }
        included
    }

    pub fn from_store(store: &KeyPathStore) -> Self {
        Self { paths: store.nested_keys().into_iter().collect() }
    }

    /// Fields of `current` whose value differs from `baseline`.
    pub fn from_diff(registry: &TypeRegistry, baseline: &dyn PresetTarget, current: &dyn PresetTarget) -> Self {
        Self::from_modifications(modified_paths(registry, baseline, current))
    }

    pub fn insert(&mut self, path: &str) {
        for (index, _) in path.match_indices('.') {
            self.paths.insert(path[..index].to_owned());
        }
        self.paths.insert(path.to_owned());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.paths.iter().map(String::as_str)
    }

    /// Included paths that are not an ancestor of another included path.
    pub fn leaves(&self) -> Vec<&str> {
        self.iter()
            .filter(|path| {
                let prefix = format!("{path}.");
                !self.paths.iter().any(|other| other.starts_with(&prefix))
            })
            .collect()
    }

    /// Everything reachable from `candidates` that is not included: the
    /// exclusion list a diffing tool keeps so only included fields survive.
    pub fn excluded_from<I, P>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let all = Self::from_modifications(candidates);
        all.paths.difference(&self.paths).cloned().collect()
    }

    pub fn union(&self, other: &IncludedPaths) -> IncludedPaths {
        Self { paths: self.paths.union(&other.paths).cloned().collect() }
    }
}

impl<S: AsRef<str>> FromIterator<S> for IncludedPaths {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::from_modifications(iter)
    }
}

/// Declared fields of `current` (in declaration order) whose values differ from `baseline`.
pub fn modified_paths(registry: &TypeRegistry, baseline: &dyn PresetTarget, current: &dyn PresetTarget) -> Vec<String> {
    registry
        .declared_fields(current.type_name())
        .into_iter()
        .filter(|field| field.kind != FieldKind::Unsupported)
        .filter(|field| {
            let now = current.read_field(&field.path);
            now.is_some() && now != baseline.read_field(&field.path)
        })
        .map(|field| field.path.into_owned())
        .collect()
}
