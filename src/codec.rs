//! Moves field values between live instances and a [`KeyPathStore`].
//!
//! Capture reads the included paths off an instance and records one leaf per
//! field. Apply walks the leaves of a store and writes each one back, skipping
//! anything that does not resolve on the target instead of failing the whole
//! operation.

use crate::config::{CodecConfig, KindMismatchPolicy};
use crate::error::PresetError;
use crate::key_path::{mask_bits, mask_value, KeyPathStore, Leaf};
use crate::references::ObjectReferences;
use crate::reflect::{FieldKind, FieldValue, PresetTarget, TypeRegistry, TypeRole, TypeSchema};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub captured: usize,
    pub skipped_unsupported: Vec<String>,
    pub skipped_missing: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub store: KeyPathStore,
    pub references: ObjectReferences,
    pub report: CaptureReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub written: usize,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PropertyCodec {
    registry: Arc<TypeRegistry>,
    config: CodecConfig,
}

impl PropertyCodec {
    pub fn new(registry: Arc<TypeRegistry>, config: CodecConfig) -> Self {
        Self { registry, config }
    }

    pub fn with_registry(registry: TypeRegistry) -> Self {
        Self::new(Arc::new(registry), CodecConfig::default())
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Records the included paths of `target` into a fresh store and reference table.
    ///
    /// Paths are visited in the given order, which fixes the reference indices.
    /// A path that is a prefix of another included path names a nested mapping
    /// and is not captured on its own.
    pub fn capture<I, P>(&self, target: &dyn PresetTarget, paths: I) -> Capture
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let paths: Vec<String> = paths.into_iter().map(|path| path.as_ref().to_owned()).collect();
        let mut seen = HashSet::with_capacity(paths.len());
        let mut capture = Capture::default();
        for path in &paths {
            if !seen.insert(path.as_str()) || is_mapping_path(path, &paths) {
                continue;
            }
            let Some(value) = target.read_field(path) else {
                log::debug!("[preset] {} has no field '{path}', not captured", target.type_name());
                capture.report.skipped_missing.push(path.clone());
                continue;
            };
            match self.encode(path, value, &mut capture.references) {
                Some(encoded) => {
                    capture.store.set_nested(path, encoded);
                    capture.report.captured += 1;
                }
                None => capture.report.skipped_unsupported.push(path.clone()),
            }
        }
        capture
    }

    fn encode(&self, path: &str, value: FieldValue, references: &mut ObjectReferences) -> Option<Value> {
        match value {
            FieldValue::Bool(b) => Some(Value::Bool(b)),
            FieldValue::Integer(int) | FieldValue::Enum(int) => Some(Value::from(int)),
            FieldValue::Character(ch) => Some(Value::from(i64::from(u32::from(ch)))),
            FieldValue::Float(float) => {
                let encoded = Leaf::Float(float).into_value();
                if encoded.is_none() {
                    log::warn!("[preset] float at '{path}' is not finite ({float}), not captured");
                }
                encoded
            }
            FieldValue::String(s) => Some(Value::String(s)),
            FieldValue::Reference(handle) => Some(Value::from(references.encode(handle.as_ref()))),
            FieldValue::Mask(bits) => Some(mask_value(bits)),
            FieldValue::Unsupported(kind) => {
                if self.config.warn_unsupported {
                    log::warn!("[preset] type {kind} is not supported (path: {path})");
                } else {
                    log::debug!("[preset] type {kind} is not supported (path: {path})");
                }
                None
            }
        }
    }

    /// The registered schema for a preset's target type.
    pub fn resolve_target_type(&self, target_type: &str) -> Result<&TypeSchema, PresetError> {
        if target_type.is_empty() {
            return Err(PresetError::Uninitialized);
        }
        self.registry.resolve(target_type).ok_or_else(|| PresetError::UnknownTargetType(target_type.to_owned()))
    }

    pub fn can_apply(&self, target_type: &str, target: Option<&dyn PresetTarget>) -> bool {
        let Some(target) = target else {
            return false;
        };
        let Ok(schema) = self.resolve_target_type(target_type) else {
            return false;
        };
        select_instance(schema, target)
            .is_some_and(|instance| self.registry.is_subtype(instance.type_name(), &schema.name))
    }

    /// Writes every leaf of `store` onto `target`.
    ///
    /// The type gate runs before any write, so a rejected target is left
    /// untouched. Leaves that do not resolve are listed in the report.
    pub fn apply(
        &self,
        target_type: &str,
        store: &KeyPathStore,
        references: &ObjectReferences,
        target: Option<&mut dyn PresetTarget>,
    ) -> Result<ApplyReport, PresetError> {
        let target = target.ok_or(PresetError::NoTarget)?;
        let schema = self.resolve_target_type(target_type)?;
        let container_name = target.type_name().to_owned();
        let target = select_instance_mut(schema, target).ok_or_else(|| PresetError::MissingSubInstance {
            container: container_name,
            component: schema.name.to_string(),
        })?;
        let instance_type = target.type_name().to_owned();
        if !self.registry.is_subtype(&instance_type, &schema.name) {
            return Err(PresetError::NotApplicable { target: instance_type, expected: schema.name.to_string() });
        }

        let mut report = ApplyReport::default();
        for (path, raw) in store.leaf_paths() {
            let kind =
                self.registry.field_kind(&instance_type, &path).or_else(|| target.read_field(&path).map(|v| v.kind()));
            let Some(kind) = kind else {
                log::debug!("[preset] {instance_type} has no field '{path}', skipped");
                report.skipped.push(path);
                continue;
            };
            let Some(value) = self.decode(kind, raw, references) else {
                log::warn!("[preset] stored {} at '{path}' does not fit {kind} field of {instance_type}, skipped", leaf_label(raw));
                report.skipped.push(path);
                continue;
            };
            match target.write_field(&path, value) {
                Ok(()) => report.written += 1,
                Err(err) => {
                    log::warn!("[preset] {instance_type}: {err}, skipped");
                    report.skipped.push(path);
                }
            }
        }
        if self.config.notify_listeners {
            target.on_preset_applied();
        }
        Ok(report)
    }

    fn decode(&self, kind: FieldKind, raw: &Value, references: &ObjectReferences) -> Option<FieldValue> {
        let widen = self.config.kind_mismatch == KindMismatchPolicy::Widen;
        let leaf = Leaf::from_value(raw)?;
        match (kind, leaf) {
            (FieldKind::Bool, Leaf::Bool(b)) => Some(FieldValue::Bool(b)),
            (FieldKind::Integer, Leaf::Integer(int)) => Some(FieldValue::Integer(int)),
            (FieldKind::Integer, Leaf::Float(float)) if widen => integral(float).map(FieldValue::Integer),
            (FieldKind::Enum, Leaf::Integer(int)) => Some(FieldValue::Enum(int)),
            (FieldKind::Enum, Leaf::Float(float)) if widen => integral(float).map(FieldValue::Enum),
            (FieldKind::Character, Leaf::Integer(int)) => to_char(int),
            (FieldKind::Character, Leaf::Float(float)) if widen => integral(float).and_then(to_char),
            (FieldKind::Float, Leaf::Float(float)) => Some(FieldValue::Float(float)),
            (FieldKind::Float, Leaf::Integer(int)) if widen && int.unsigned_abs() <= MAX_EXACT_FLOAT_INT => {
                Some(FieldValue::Float(int as f64))
            }
            (FieldKind::String, Leaf::String(s)) => Some(FieldValue::String(s)),
            (FieldKind::ObjectReference, Leaf::Integer(index)) => {
                Some(FieldValue::Reference(references.resolve(index).cloned()))
            }
            (FieldKind::ObjectReference, Leaf::Float(float)) if widen => {
                integral(float).map(|index| FieldValue::Reference(references.resolve(index).cloned()))
            }
            (FieldKind::ObjectReference, Leaf::Null) if widen => Some(FieldValue::Reference(None)),
            (FieldKind::Mask, Leaf::Mask(bits)) => Some(FieldValue::Mask(bits)),
            (FieldKind::Mask, Leaf::Integer(_)) => mask_bits(raw).map(FieldValue::Mask),
            _ => None,
        }
    }
}

/// Largest integer magnitude an `f64` holds exactly.
const MAX_EXACT_FLOAT_INT: u64 = 1 << 53;

fn is_mapping_path(path: &str, paths: &[String]) -> bool {
    paths.iter().any(|other| {
        other.len() > path.len() && other.starts_with(path) && other.as_bytes()[path.len()] == b'.'
    })
}

fn integral(float: f64) -> Option<i64> {
    if float.is_finite() && float.fract() == 0.0 && float >= i64::MIN as f64 && float < i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

fn to_char(int: i64) -> Option<FieldValue> {
    u32::try_from(int).ok().and_then(char::from_u32).map(FieldValue::Character)
}

fn leaf_label(raw: &Value) -> &'static str {
    Leaf::from_value(raw).map(|leaf| leaf.kind_label()).unwrap_or("nested value")
}

/// Component presets applied to a container target land on the matching component.
fn select_instance<'t>(schema: &TypeSchema, target: &'t dyn PresetTarget) -> Option<&'t dyn PresetTarget> {
    if schema.role == TypeRole::Component {
        if let Some(container) = target.as_container() {
            return container.sub_instance(&schema.name);
        }
    }
    Some(target)
}

fn select_instance_mut<'t>(
    schema: &TypeSchema,
    target: &'t mut dyn PresetTarget,
) -> Option<&'t mut dyn PresetTarget> {
    if schema.role == TypeRole::Component && target.as_container().is_some() {
        return target.as_container_mut().and_then(|container| container.sub_instance_mut(&schema.name));
    }
    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::references::ObjectHandle;
    use crate::reflect::{FieldError, TypeSchema};

    #[derive(Default)]
    struct Gauge {
        level: f64,
        ticks: i64,
        glyph: char,
        owner: Option<ObjectHandle>,
        backup: Option<ObjectHandle>,
        samples: Vec<f32>,
        mode: i64,
        layers: u32,
    }

    impl PresetTarget for Gauge {
        fn type_name(&self) -> &str {
            "Gauge"
        }

        fn read_field(&self, path: &str) -> Option<FieldValue> {
            match path {
                "level" => Some(FieldValue::Float(self.level)),
                "ticks" => Some(FieldValue::Integer(self.ticks)),
                "glyph" => Some(FieldValue::Character(self.glyph)),
                "owner" => Some(FieldValue::Reference(self.owner.clone())),
                "backup" => Some(FieldValue::Reference(self.backup.clone())),
                "samples" => Some(FieldValue::Unsupported("array")),
                "mode" => Some(FieldValue::Enum(self.mode)),
                "layers" => Some(FieldValue::Mask(self.layers)),
                _ => None,
            }
        }

        fn write_field(&mut self, path: &str, value: FieldValue) -> Result<(), FieldError> {
            match (path, value) {
                ("level", FieldValue::Float(v)) => self.level = v,
                ("ticks", FieldValue::Integer(v)) => self.ticks = v,
                ("glyph", FieldValue::Character(v)) => self.glyph = v,
                ("owner", FieldValue::Reference(v)) => self.owner = v,
                ("backup", FieldValue::Reference(v)) => self.backup = v,
                ("mode", FieldValue::Enum(v)) => self.mode = v,
                ("layers", FieldValue::Mask(v)) => self.layers = v,
                ("samples", _) => return Err(FieldError::ReadOnly(path.to_owned())),
                (path, value) => return Err(FieldError::mismatch(path, FieldKind::Unsupported, &value)),
            }
            Ok(())
        }
    }

    fn codec(policy: KindMismatchPolicy) -> PropertyCodec {
        let mut registry = TypeRegistry::new();
        registry.register(
            TypeSchema::object("Gauge")
                .field("level", FieldKind::Float)
                .field("ticks", FieldKind::Integer)
                .field("glyph", FieldKind::Character)
                .field("owner", FieldKind::ObjectReference)
                .field("backup", FieldKind::ObjectReference)
                .field("samples", FieldKind::Unsupported)
                .field("mode", FieldKind::Enum)
                .field("layers", FieldKind::Mask),
        );
        let config = CodecConfig { kind_mismatch: policy, ..CodecConfig::default() };
        PropertyCodec::new(Arc::new(registry), config)
    }

    #[test]
    fn capture_dispatches_on_kind_and_skips_unsupported() {
        let codec = codec(KindMismatchPolicy::Widen);
        let shared = ObjectHandle::new("prefabs/crate");
        let gauge = Gauge {
            level: 0.75,
            ticks: 9,
            glyph: 'k',
            owner: Some(shared.clone()),
            backup: Some(shared),
            samples: vec![1.0],
            ..Gauge::default()
        };
        let capture = codec.capture(&gauge, ["level", "ticks", "glyph", "owner", "backup", "samples", "ghost"]);
        assert_eq!(capture.report.captured, 5);
        assert_eq!(capture.report.skipped_unsupported, vec!["samples".to_string()]);
        assert_eq!(capture.report.skipped_missing, vec!["ghost".to_string()]);
        assert_eq!(capture.references.len(), 1);
        assert_eq!(capture.store.leaf("owner"), Some(Leaf::Integer(0)));
        assert_eq!(capture.store.leaf("backup"), Some(Leaf::Integer(0)));
        assert_eq!(capture.store.leaf("glyph"), Some(Leaf::Integer('k' as i64)));
        assert_eq!(gauge.samples.len(), 1);
    }

    #[test]
    fn null_reference_captures_as_minus_one_and_applies_back_to_none() {
        let codec = codec(KindMismatchPolicy::Widen);
        let source = Gauge::default();
        let capture = codec.capture(&source, ["owner"]);
        assert_eq!(capture.store.leaf("owner"), Some(Leaf::Integer(-1)));

        let mut target = Gauge { owner: Some(ObjectHandle::new("stale")), ..Gauge::default() };
        codec
            .apply("Gauge", &capture.store, &capture.references, Some(&mut target))
            .expect("apply succeeds");
        assert_eq!(target.owner, None);
    }

    #[test]
    fn out_of_range_reference_applies_as_none() {
        let codec = codec(KindMismatchPolicy::Widen);
        let store = KeyPathStore::parse(r#"{"owner": 7}"#).expect("parse");
        let mut target = Gauge { owner: Some(ObjectHandle::new("old")), ..Gauge::default() };
        let report =
            codec.apply("Gauge", &store, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(report.written, 1);
        assert_eq!(target.owner, None);
    }

    #[test]
    fn widen_policy_coerces_lossless_numbers() {
        let codec = codec(KindMismatchPolicy::Widen);
        let store = KeyPathStore::parse(r#"{"level": 2, "ticks": 4.0, "glyph": 65.0}"#).expect("parse");
        let mut target = Gauge::default();
        let report =
            codec.apply("Gauge", &store, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(report.written, 3);
        assert_eq!(target.level, 2.0);
        assert_eq!(target.ticks, 4);
        assert_eq!(target.glyph, 'A');
    }

    #[test]
    fn widen_policy_still_skips_lossy_numbers() {
        let codec = codec(KindMismatchPolicy::Widen);
        let store = KeyPathStore::parse(r#"{"ticks": 4.5, "level": "fast"}"#).expect("parse");
        let mut target = Gauge { ticks: 1, level: 1.0, ..Gauge::default() };
        let report =
            codec.apply("Gauge", &store, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(report.written, 0);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(target.ticks, 1);
        assert_eq!(target.level, 1.0);
    }

    #[test]
    fn skip_policy_rejects_mismatched_kinds() {
        let codec = codec(KindMismatchPolicy::Skip);
        let store = KeyPathStore::parse(r#"{"level": 2, "ticks": 3}"#).expect("parse");
        let mut target = Gauge::default();
        let report =
            codec.apply("Gauge", &store, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped, vec!["level".to_string()]);
        assert_eq!(target.ticks, 3);
    }

    #[test]
    fn unsupported_fields_skip_only_that_path() {
        let codec = codec(KindMismatchPolicy::Widen);
        let store = KeyPathStore::parse(r#"{"samples": 1, "ticks": 5}"#).expect("parse");
        let mut target = Gauge::default();
        let report =
            codec.apply("Gauge", &store, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(target.ticks, 5);
        assert_eq!(report.skipped, vec!["samples".to_string()]);
    }

    #[test]
    fn unknown_or_missing_type_is_an_error_not_a_panic() {
        let codec = codec(KindMismatchPolicy::Widen);
        let store = KeyPathStore::new();
        let refs = ObjectReferences::new();
        let mut target = Gauge::default();
        assert_eq!(
            codec.apply("Dial", &store, &refs, Some(&mut target)).unwrap_err(),
            PresetError::UnknownTargetType("Dial".into())
        );
        assert_eq!(codec.apply("", &store, &refs, Some(&mut target)).unwrap_err(), PresetError::Uninitialized);
        assert_eq!(codec.apply("Gauge", &store, &refs, None).unwrap_err(), PresetError::NoTarget);
        assert!(!codec.can_apply("Dial", Some(&target)));
        assert!(!codec.can_apply("Gauge", None));
        assert!(codec.can_apply("Gauge", Some(&target)));
    }

    #[test]
    fn enum_fields_store_their_backing_integer() {
        let widen = codec(KindMismatchPolicy::Widen);
        let capture = widen.capture(&Gauge { mode: 3, ..Gauge::default() }, ["mode"]);
        assert_eq!(capture.store.leaf("mode"), Some(Leaf::Integer(3)));

        let mut target = Gauge::default();
        widen.apply("Gauge", &capture.store, &capture.references, Some(&mut target)).expect("apply");
        assert_eq!(target.mode, 3);

        let widened = KeyPathStore::parse(r#"{"mode": 2.0}"#).expect("parse");
        widen.apply("Gauge", &widened, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(target.mode, 2);

        let strict = codec(KindMismatchPolicy::Skip);
        let report =
            strict.apply("Gauge", &widened, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(report.skipped, vec!["mode".to_string()]);
        assert_eq!(target.mode, 2);
    }

    #[test]
    fn masks_capture_as_bits_object_and_read_either_shape() {
        let codec = codec(KindMismatchPolicy::Skip);
        let capture = codec.capture(&Gauge { layers: 0b101, ..Gauge::default() }, ["layers"]);
        assert_eq!(capture.store.to_text(), r#"{"layers":{"m_Bits":5}}"#);
        assert_eq!(capture.store.leaf("layers"), Some(Leaf::Mask(5)));

        let mut target = Gauge::default();
        let object_form = KeyPathStore::parse(r#"{"layers": {"m_Bits": 6}}"#).expect("parse");
        let report =
            codec.apply("Gauge", &object_form, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(report.written, 1);
        assert_eq!(target.layers, 6);

        let bare = KeyPathStore::parse(r#"{"layers": 12}"#).expect("parse");
        codec.apply("Gauge", &bare, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(target.layers, 12);

        let everything = KeyPathStore::parse(r#"{"layers": -1}"#).expect("parse");
        codec.apply("Gauge", &everything, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(target.layers, u32::MAX);
    }

    #[test]
    fn integral_float_reference_resolves_under_widen() {
        let codec = codec(KindMismatchPolicy::Widen);
        let references = ObjectReferences::from_handles(vec![ObjectHandle::new("a")]);
        let store = KeyPathStore::parse(r#"{"owner": 0.0, "backup": 0.5}"#).expect("parse");
        let mut target =
            Gauge { owner: Some(ObjectHandle::new("old")), backup: Some(ObjectHandle::new("old")), ..Gauge::default() };
        let report = codec.apply("Gauge", &store, &references, Some(&mut target)).expect("apply");
        assert_eq!(target.owner, Some(ObjectHandle::new("a")));
        assert_eq!(target.backup, Some(ObjectHandle::new("old")));
        assert_eq!(report.skipped, vec!["backup".to_string()]);
    }

    #[test]
    fn integers_beyond_exact_float_range_are_not_widened() {
        let codec = codec(KindMismatchPolicy::Widen);
        let store = KeyPathStore::parse(r#"{"level": 9007199254740993}"#).expect("parse");
        let mut target = Gauge { level: 1.5, ..Gauge::default() };
        let report = codec.apply("Gauge", &store, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(report.skipped, vec!["level".to_string()]);
        assert_eq!(target.level, 1.5);

        let exact = KeyPathStore::parse(r#"{"level": 9007199254740992}"#).expect("parse");
        codec.apply("Gauge", &exact, &ObjectReferences::new(), Some(&mut target)).expect("apply");
        assert_eq!(target.level, 9007199254740992.0);
    }

    #[test]
    fn intermediate_paths_are_not_captured() {
        let codec = codec(KindMismatchPolicy::Widen);
        let capture = codec.capture(&Gauge::default(), ["stats", "stats.level", "ticks", "ticks"]);
        assert_eq!(capture.report.captured, 1);
        assert_eq!(capture.report.skipped_missing, vec!["stats.level".to_string()]);
    }
}
