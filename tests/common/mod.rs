#![allow(dead_code)]

use kestrel_preset::{
    FieldError, FieldKind, FieldValue, ObjectHandle, PresetContainer, PresetTarget, Reflect, TypeRegistry,
    TypeSchema,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mover {
    pub enabled: bool,
    pub speed: f64,
    pub label: String,
    pub target: Option<ObjectHandle>,
    pub jump: f64,
    pub waypoints: Vec<f32>,
    pub applied_count: u32,
}

impl PresetTarget for Mover {
    fn type_name(&self) -> &str {
        "Mover"
    }

    fn read_field(&self, path: &str) -> Option<FieldValue> {
        match path {
            "enabled" => Some(FieldValue::Bool(self.enabled)),
            "speed" => Some(FieldValue::Float(self.speed)),
            "label" => Some(FieldValue::String(self.label.clone())),
            "target" => Some(FieldValue::Reference(self.target.clone())),
            "stats.jump" => Some(FieldValue::Float(self.jump)),
            "waypoints" => Some(FieldValue::Unsupported("list")),
            _ => None,
        }
    }

    fn write_field(&mut self, path: &str, value: FieldValue) -> Result<(), FieldError> {
        match (path, value) {
            ("enabled", FieldValue::Bool(v)) => self.enabled = v,
            ("speed", FieldValue::Float(v)) => self.speed = v,
            ("label", FieldValue::String(v)) => self.label = v,
            ("target", FieldValue::Reference(v)) => self.target = v,
            ("stats.jump", FieldValue::Float(v)) => self.jump = v,
            (path, value) => return Err(FieldError::mismatch(path, FieldKind::Unsupported, &value)),
        }
        Ok(())
    }

    fn on_preset_applied(&mut self) {
        self.applied_count += 1;
    }
}

impl Reflect for Mover {
    fn schema() -> TypeSchema {
        TypeSchema::component("Mover")
            .with_base("Behaviour")
            .field("speed", FieldKind::Float)
            .field("label", FieldKind::String)
            .field("target", FieldKind::ObjectReference)
            .field("stats.jump", FieldKind::Float)
            .field("waypoints", FieldKind::Unsupported)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Door {
    pub enabled: bool,
    pub open: bool,
    pub label: String,
}

impl PresetTarget for Door {
    fn type_name(&self) -> &str {
        "Door"
    }

    fn read_field(&self, path: &str) -> Option<FieldValue> {
        match path {
            "enabled" => Some(FieldValue::Bool(self.enabled)),
            "open" => Some(FieldValue::Bool(self.open)),
            "label" => Some(FieldValue::String(self.label.clone())),
            _ => None,
        }
    }

    fn write_field(&mut self, path: &str, value: FieldValue) -> Result<(), FieldError> {
        match (path, value) {
            ("enabled", FieldValue::Bool(v)) => self.enabled = v,
            ("open", FieldValue::Bool(v)) => self.open = v,
            ("label", FieldValue::String(v)) => self.label = v,
            (path, value) => return Err(FieldError::mismatch(path, FieldKind::Unsupported, &value)),
        }
        Ok(())
    }
}

impl Reflect for Door {
    fn schema() -> TypeSchema {
        TypeSchema::component("Door")
            .with_base("Behaviour")
            .field("open", FieldKind::Bool)
            .field("label", FieldKind::String)
    }
}

/// A container holding at most one mover, standing in for a scene object.
#[derive(Debug, Default)]
pub struct Rig {
    pub mover: Option<Mover>,
}

impl PresetTarget for Rig {
    fn type_name(&self) -> &str {
        "Rig"
    }

    fn read_field(&self, _path: &str) -> Option<FieldValue> {
        None
    }

    fn write_field(&mut self, path: &str, _value: FieldValue) -> Result<(), FieldError> {
        Err(FieldError::UnknownPath(path.to_owned()))
    }

    fn as_container(&self) -> Option<&dyn PresetContainer> {
        Some(self)
    }

    fn as_container_mut(&mut self) -> Option<&mut dyn PresetContainer> {
        Some(self)
    }
}

impl PresetContainer for Rig {
    fn sub_instance(&self, type_name: &str) -> Option<&dyn PresetTarget> {
        match type_name {
            "Mover" => self.mover.as_ref().map(|mover| mover as &dyn PresetTarget),
            _ => None,
        }
    }

    fn sub_instance_mut(&mut self, type_name: &str) -> Option<&mut dyn PresetTarget> {
        match type_name {
            "Mover" => self.mover.as_mut().map(|mover| mover as &mut dyn PresetTarget),
            _ => None,
        }
    }
}

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register(TypeSchema::component("Behaviour").field("enabled", FieldKind::Bool))
        .register_type::<Mover>()
        .register_type::<Door>()
        .register(TypeSchema::container("Rig"));
    registry
}
