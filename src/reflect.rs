//! Field-level access to live instances.
//!
//! Hosts describe each patchable type with a [`TypeSchema`] and expose
//! instances through [`PresetTarget`]. Composite objects that hold typed
//! sub-parts (an entity and its components) additionally implement
//! [`PresetContainer`].

use crate::references::ObjectHandle;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Integer,
    Character,
    Enum,
    Float,
    String,
    ObjectReference,
    /// 32-bit bitmask such as a layer selection.
    Mask,
    Unsupported,
}

impl FieldKind {
    pub fn label(self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Integer => "integer",
            FieldKind::Character => "character",
            FieldKind::Enum => "enum",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::ObjectReference => "object reference",
            FieldKind::Mask => "mask",
            FieldKind::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Integer(i64),
    Character(char),
    /// Backing integer of an enum-like field.
    Enum(i64),
    Float(f64),
    String(String),
    Reference(Option<ObjectHandle>),
    Mask(u32),
    /// A field the codec cannot store; carries the host's name for its kind.
    Unsupported(&'static str),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Character(_) => FieldKind::Character,
            FieldValue::Enum(_) => FieldKind::Enum,
            FieldValue::Float(_) => FieldKind::Float,
            FieldValue::String(_) => FieldKind::String,
            FieldValue::Reference(_) => FieldKind::ObjectReference,
            FieldValue::Mask(_) => FieldKind::Mask,
            FieldValue::Unsupported(_) => FieldKind::Unsupported,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("no field at path '{0}'")]
    UnknownPath(String),
    #[error("field '{path}' expects {expected}, got {found}")]
    KindMismatch { path: String, expected: FieldKind, found: FieldKind },
    #[error("field '{0}' is read-only")]
    ReadOnly(String),
}

impl FieldError {
    pub fn mismatch(path: &str, expected: FieldKind, found: &FieldValue) -> Self {
        FieldError::KindMismatch { path: path.to_owned(), expected, found: found.kind() }
    }
}

/// Where instances of a type live in the host object model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRole {
    /// Standalone object such as an asset.
    Object,
    /// Sub-part that is attached to a container.
    Component,
    /// Holds components and can hand them out by type.
    Container,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub path: Cow<'static, str>,
    pub kind: FieldKind,
}

impl FieldSchema {
    pub fn new(path: impl Into<Cow<'static, str>>, kind: FieldKind) -> Self {
        Self { path: path.into(), kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSchema {
    pub name: Cow<'static, str>,
    pub base: Option<Cow<'static, str>>,
    pub role: TypeRole,
    pub fields: Vec<FieldSchema>,
}

impl TypeSchema {
    pub fn new(name: impl Into<Cow<'static, str>>, role: TypeRole) -> Self {
        Self { name: name.into(), base: None, role, fields: Vec::new() }
    }

    pub fn object(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, TypeRole::Object)
    }

    pub fn component(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, TypeRole::Component)
    }

    pub fn container(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, TypeRole::Container)
    }

    pub fn with_base(mut self, base: impl Into<Cow<'static, str>>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn field(mut self, path: impl Into<Cow<'static, str>>, kind: FieldKind) -> Self {
        self.fields.push(FieldSchema::new(path, kind));
        self
    }

    pub fn own_field(&self, path: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.path == path)
    }
}

/// A live instance whose fields a preset can read and overwrite.
pub trait PresetTarget {
    fn type_name(&self) -> &str;

    /// Current value at `path`, or `None` when the path does not exist.
    fn read_field(&self, path: &str) -> Option<FieldValue>;

    fn write_field(&mut self, path: &str, value: FieldValue) -> Result<(), FieldError>;

    /// Called after a preset was applied successfully.
    fn on_preset_applied(&mut self) {}

    fn as_container(&self) -> Option<&dyn PresetContainer> {
        None
    }

    fn as_container_mut(&mut self) -> Option<&mut dyn PresetContainer> {
        None
    }
}

pub trait PresetContainer {
    fn sub_instance(&self, type_name: &str) -> Option<&dyn PresetTarget>;

    fn sub_instance_mut(&mut self, type_name: &str) -> Option<&mut dyn PresetTarget>;
}

/// Types that carry their own schema, for one-line registration.
pub trait Reflect: PresetTarget {
    fn schema() -> TypeSchema;
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeSchema>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any schema already registered under the same name.
    pub fn register(&mut self, schema: TypeSchema) -> &mut Self {
        self.types.insert(schema.name.to_string(), schema);
        self
    }

    pub fn register_type<T: Reflect>(&mut self) -> &mut Self {
        self.register(T::schema())
    }

    pub fn resolve(&self, name: &str) -> Option<&TypeSchema> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Reflexive. An unregistered link ends the chain.
    pub fn is_subtype(&self, derived: &str, base: &str) -> bool {
        self.ancestry(derived).any(|schema| schema.name == base) || derived == base
    }

    /// Own fields plus inherited ones, base types first. A redeclared path keeps
    /// the most derived kind.
    pub fn declared_fields(&self, type_name: &str) -> Vec<FieldSchema> {
        let chain: Vec<&TypeSchema> = self.ancestry(type_name).collect();
        let mut fields: Vec<FieldSchema> = Vec::new();
        for schema in chain.into_iter().rev() {
            for field in &schema.fields {
                match fields.iter_mut().find(|existing| existing.path == field.path) {
                    Some(existing) => existing.kind = field.kind,
                    None => fields.push(field.clone()),
                }
            }
        }
        fields
    }

    pub fn field_kind(&self, type_name: &str, path: &str) -> Option<FieldKind> {
        self.ancestry(type_name).find_map(|schema| schema.own_field(path)).map(|field| field.kind)
    }

    fn ancestry<'a>(&'a self, type_name: &str) -> Ancestry<'a> {
        Ancestry { registry: self, next: self.resolve(type_name), remaining: self.types.len() }
    }
}

/// Walks a type and its bases. Bounded by the registry size so a cyclic chain terminates.
struct Ancestry<'a> {
    registry: &'a TypeRegistry,
    next: Option<&'a TypeSchema>,
    remaining: usize,
}

impl<'a> Iterator for Ancestry<'a> {
    type Item = &'a TypeSchema;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next.take()?;
        self.next = current.base.as_deref().and_then(|base| self.registry.resolve(base));
        Some(current)
    }
}
