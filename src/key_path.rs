//! Dot-path addressable tree of scalar leaves backed by a JSON object.
//!
//! The textual form is plain JSON. Integral leaves are written without a
//! decimal point and floating leaves always carry one, so a leaf reloads with
//! the same kind it was stored with.

use serde_json::{Map, Value};
use std::fmt;

pub const EMPTY_STORE: &str = "{}";

/// Sole key of the object form a bitmask leaf is stored as.
pub const MASK_BITS_KEY: &str = "m_Bits";

#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// A bitmask stored as `{"m_Bits": n}`.
    Mask(u32),
}

impl Leaf {
    /// Returns `None` for nested mappings, arrays and integers outside the `i64` range.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Leaf::Null),
            Value::Bool(b) => Some(Leaf::Bool(*b)),
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Some(Leaf::Integer(int))
                } else if number.is_f64() {
                    number.as_f64().map(Leaf::Float)
                } else {
                    None
                }
            }
            Value::String(s) => Some(Leaf::String(s.clone())),
            Value::Object(_) => mask_bits(value).map(Leaf::Mask),
            Value::Array(_) => None,
        }
    }

    /// Non-finite floats have no textual form and yield `None`.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Leaf::Null => Some(Value::Null),
            Leaf::Bool(b) => Some(Value::Bool(b)),
            Leaf::Integer(int) => Some(Value::from(int)),
            Leaf::Float(float) => serde_json::Number::from_f64(float).map(Value::Number),
            Leaf::String(s) => Some(Value::String(s)),
            Leaf::Mask(bits) => Some(mask_value(bits)),
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Leaf::Null => "null",
            Leaf::Bool(_) => "bool",
            Leaf::Integer(_) => "integer",
            Leaf::Float(_) => "float",
            Leaf::String(_) => "string",
            Leaf::Mask(_) => "mask",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyPathStore {
    root: Map<String, Value>,
}

impl KeyPathStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails when the text is not JSON or its top level is not an object.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let root = serde_json::from_str::<Map<String, Value>>(text)?;
        Ok(Self { root })
    }

    /// Parses `text`, falling back to the empty store. The flag reports whether the fallback was taken.
    pub fn parse_or_empty(text: &str) -> (Self, bool) {
        match Self::parse(text) {
            Ok(store) => (store, false),
            Err(err) => {
                log::warn!("[preset] discarding malformed value store: {err}");
                (Self::new(), true)
            }
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(&self.root).unwrap_or_else(|_| EMPTY_STORE.to_owned())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn clear(&mut self) {
        self.root.clear();
    }

    /// Intermediate segments are turned into mappings, replacing any leaf in the way.
    pub fn set_nested(&mut self, path: &str, value: impl Into<Value>) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else {
            return;
        };
        let mut map = &mut self.root;
        for segment in segments {
            let slot = map.entry(segment).or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            map = match slot {
                Value::Object(inner) => inner,
                _ => return,
            };
        }
        map.insert(last.to_owned(), value.into());
    }

    pub fn get_nested(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn leaf(&self, path: &str) -> Option<Leaf> {
        self.get_nested(path).and_then(Leaf::from_value)
    }

    /// Depth-first walk over every non-mapping value. Each call starts a fresh walk.
    pub fn leaf_paths(&self) -> LeafPaths<'_> {
        LeafPaths { stack: vec![(String::new(), self.root.iter())] }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_paths().count()
    }

    /// Every key in the tree, intermediate mappings included, in depth-first order.
    pub fn nested_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        collect_keys(&self.root, "", &mut keys);
        keys
    }

    pub fn from_flat<I, P, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, V)>,
        P: AsRef<str>,
        V: Into<Value>,
    {
        let mut store = Self::new();
        for (path, value) in entries {
            store.set_nested(path.as_ref(), value);
        }
        store
    }
}

impl fmt::Display for KeyPathStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Bits of a mask in either of its stored shapes: the `{"m_Bits": n}` object
/// or a bare integer. Negative values are read as 32-bit two's complement.
pub fn mask_bits(value: &Value) -> Option<u32> {
    let raw = match value {
        Value::Object(map) if map.len() == 1 => map.get(MASK_BITS_KEY)?,
        Value::Number(_) => value,
        _ => return None,
    };
    let int = raw.as_i64()?;
    u32::try_from(int).ok().or_else(|| i32::try_from(int).ok().map(|signed| signed as u32))
}

pub fn mask_value(bits: u32) -> Value {
    let mut map = Map::new();
    map.insert(MASK_BITS_KEY.to_owned(), Value::from(bits));
    Value::Object(map)
}

/// The nested mapping under a value, unless the value is a stored mask.
fn as_mapping(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(_) if mask_bits(value).is_some() => None,
        Value::Object(inner) => Some(inner),
        _ => None,
    }
}

fn collect_keys(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = join_path(prefix, key);
        if let Some(inner) = as_mapping(value) {
            out.push(path.clone());
            collect_keys(inner, &path, out);
        } else {
            out.push(path);
        }
    }
}

pub struct LeafPaths<'a> {
    stack: Vec<(String, serde_json::map::Iter<'a>)>,
}

impl<'a> Iterator for LeafPaths<'a> {
    type Item = (String, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (prefix, iter) = self.stack.last_mut()?;
            match iter.next() {
                Some((key, value)) => {
                    let path = join_path(prefix, key);
                    match as_mapping(value) {
                        Some(inner) => self.stack.push((path, inner.iter())),
                        None => return Some((path, value)),
                    }
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
