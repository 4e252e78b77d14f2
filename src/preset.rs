use crate::codec::{ApplyReport, CaptureReport, PropertyCodec};
use crate::diff::IncludedPaths;
use crate::error::PresetError;
use crate::key_path::{KeyPathStore, Leaf, EMPTY_STORE};
use crate::references::ObjectReferences;
use crate::reflect::{FieldKind, PresetTarget, TypeRegistry};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetState {
    /// No target type yet.
    Uninitialized,
    /// Target type set, values never captured or loaded.
    TypeBound,
    Applicable,
}

/// A sparse set of field overrides bound to one target type.
///
/// Persisted as JSON with the value store embedded as text. Loading repairs a
/// store that does not parse to the empty store instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "PresetRepr", into = "PresetRepr")]
pub struct Preset {
    id: Uuid,
    target_type: String,
    values: Option<KeyPathStore>,
    object_references: ObjectReferences,
    healed: bool,
    clean_hash: Option<blake3::Hash>,
}

fn empty_values() -> String {
    EMPTY_STORE.to_owned()
}

#[derive(Serialize, Deserialize)]
struct PresetRepr {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    #[serde(default)]
    target_type: String,
    #[serde(default = "empty_values")]
    values: String,
    #[serde(default)]
    object_references: ObjectReferences,
}

impl From<PresetRepr> for Preset {
    fn from(repr: PresetRepr) -> Self {
        let (store, healed) = KeyPathStore::parse_or_empty(&repr.values);
        Self {
            id: repr.id,
            target_type: repr.target_type,
            values: Some(store),
            object_references: repr.object_references,
            healed,
            clean_hash: None,
        }
    }
}

impl From<Preset> for PresetRepr {
    fn from(preset: Preset) -> Self {
        let values = preset.values_text();
        PresetRepr {
            id: preset.id,
            target_type: preset.target_type,
            values,
            object_references: preset.object_references,
        }
    }
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            target_type: String::new(),
            values: None,
            object_references: ObjectReferences::new(),
            healed: false,
            clean_hash: None,
        }
    }
}

impl Preset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_type(target_type: impl Into<String>) -> Self {
        let mut preset = Self::new();
        preset.set_target_type(target_type);
        preset
    }

    pub fn with_values(target_type: impl Into<String>, values: &str, references: ObjectReferences) -> Self {
        let mut preset = Self::for_type(target_type);
        preset.set_values_text(values);
        preset.object_references = references;
        preset
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Key an import system records to rebuild dependents when this preset changes.
    pub fn dependency_key(&self) -> String {
        format!("kestrel_preset::Preset.{}", self.id)
    }

    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    /// An empty name unbinds the preset and drops its values.
    pub fn set_target_type(&mut self, target_type: impl Into<String>) {
        self.target_type = target_type.into();
        if self.target_type.is_empty() {
            self.values = None;
            self.object_references.clear();
        }
    }

    pub fn state(&self) -> PresetState {
        match (self.target_type.is_empty(), &self.values) {
            (true, _) => PresetState::Uninitialized,
            (false, None) => PresetState::TypeBound,
            (false, Some(_)) => PresetState::Applicable,
        }
    }

    pub fn values(&self) -> Option<&KeyPathStore> {
        self.values.as_ref()
    }

    pub fn values_text(&self) -> String {
        self.values.as_ref().map(KeyPathStore::to_text).unwrap_or_else(empty_values)
    }

    /// Replaces the stored values. Text that does not parse becomes the empty
    /// store; the return value reports whether that happened.
    pub fn set_values_text(&mut self, text: &str) -> bool {
        let (store, healed) = KeyPathStore::parse_or_empty(text);
        self.values = Some(store);
        self.healed = healed;
        healed
    }

    /// Whether the last load or text mutation had to discard a malformed store.
    pub fn was_healed(&self) -> bool {
        self.healed
    }

    pub fn object_references(&self) -> &ObjectReferences {
        &self.object_references
    }

    /// Rebuilds values and references from `target`. An unbound preset adopts
    /// the target's type; a bound one only records instances of that type and
    /// is left unchanged otherwise.
    pub fn capture<I, P>(
        &mut self,
        codec: &PropertyCodec,
        target: &dyn PresetTarget,
        paths: I,
    ) -> Result<CaptureReport, PresetError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        if self.target_type.is_empty() {
            self.target_type = target.type_name().to_owned();
        } else if !codec.registry().is_subtype(target.type_name(), &self.target_type) {
            log::warn!(
                "[preset] {} not captured: '{}' is not a '{}'",
                self.dependency_key(),
                target.type_name(),
                self.target_type
            );
            return Err(PresetError::NotApplicable {
                target: target.type_name().to_owned(),
                expected: self.target_type.clone(),
            });
        }
        let capture = codec.capture(target, paths);
        self.values = Some(capture.store);
        self.object_references = capture.references;
        self.healed = false;
        Ok(capture.report)
    }

    /// Re-captures only when `included` no longer matches the stored keys.
    /// Returns whether a capture happened.
    pub fn sync_capture(
        &mut self,
        codec: &PropertyCodec,
        target: &dyn PresetTarget,
        included: &IncludedPaths,
    ) -> Result<bool, PresetError> {
        let current = self.values.as_ref().map(IncludedPaths::from_store).unwrap_or_default();
        if &current == included {
            return Ok(false);
        }
        self.capture(codec, target, included.iter())?;
        Ok(true)
    }

    pub fn can_be_applied_to(&self, codec: &PropertyCodec, target: Option<&dyn PresetTarget>) -> bool {
        codec.can_apply(&self.target_type, target)
    }

    pub fn apply_to(&self, codec: &PropertyCodec, target: Option<&mut dyn PresetTarget>) {
        self.try_apply_to(codec, target);
    }

    pub fn try_apply_to(&self, codec: &PropertyCodec, target: Option<&mut dyn PresetTarget>) -> bool {
        match self.apply_checked(codec, target) {
            Ok(_) => true,
            Err(err) => {
                log::debug!("[preset] {} not applied: {err}", self.dependency_key());
                false
            }
        }
    }

    pub fn apply_checked(
        &self,
        codec: &PropertyCodec,
        target: Option<&mut dyn PresetTarget>,
    ) -> Result<ApplyReport, PresetError> {
        let store = match self.state() {
            PresetState::Uninitialized => return Err(PresetError::Uninitialized),
            PresetState::TypeBound => return Err(PresetError::NotValidated),
            PresetState::Applicable => self.values.as_ref().ok_or(PresetError::NotValidated)?,
        };
        codec.apply(&self.target_type, store, &self.object_references, target)
    }

    /// Displayable reason this preset cannot currently be applied to anything.
    pub fn target_type_error(&self, registry: &TypeRegistry) -> Option<PresetError> {
        if self.target_type.is_empty() {
            return Some(PresetError::Uninitialized);
        }
        if registry.resolve(&self.target_type).is_none() {
            return Some(PresetError::UnknownTargetType(self.target_type.clone()));
        }
        None
    }

    /// Reference leaves whose index is neither -1 nor inside the reference table.
    pub fn validate_references(&self, registry: &TypeRegistry) -> Vec<String> {
        let Some(store) = &self.values else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        for (path, raw) in store.leaf_paths() {
            if registry.field_kind(&self.target_type, &path) != Some(FieldKind::ObjectReference) {
                continue;
            }
            match Leaf::from_value(raw) {
                Some(Leaf::Integer(index)) if self.object_references.is_valid_index(index) => {}
                Some(Leaf::Integer(index)) => issues.push(format!(
                    "'{path}' references index {index} but only {} objects are recorded",
                    self.object_references.len()
                )),
                other => issues.push(format!(
                    "'{path}' holds a {} instead of a reference index",
                    other.map(|leaf| leaf.kind_label()).unwrap_or("nested value")
                )),
            }
        }
        issues
    }

    pub fn content_hash(&self) -> blake3::Hash {
        blake3::hash(self.to_json_string().as_bytes())
    }

    pub fn mark_clean(&mut self) {
        self.clean_hash = Some(self.content_hash());
    }

    /// True until [`mark_clean`](Self::mark_clean) has recorded the current content.
    pub fn is_dirty(&self) -> bool {
        self.clean_hash != Some(self.content_hash())
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Reading preset file {}", path.display()))?;
        let mut preset = serde_json::from_slice::<Preset>(&bytes)
            .with_context(|| format!("Parsing preset file {}", path.display()))?;
        preset.mark_clean();
        Ok(preset)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating preset directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json.as_bytes()).with_context(|| format!("Writing preset file {}", path.display()))?;
        Ok(())
    }
}
