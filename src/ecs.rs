//! bevy_ecs hosting: entities act as preset containers and appliers ride on
//! entities as components.
//!
//! Component types are made visible to presets by registering accessors on
//! the [`PresetRuntime`] resource. [`run_preset_appliers`] drives the
//! awake/enable/start sequence and [`bake_imported_presets`] runs the import
//! pass, dropping appliers that retire.

use crate::applier::{ApplierAction, ApplyEvents, PresetApplier, TargetResolver};
use crate::codec::{ApplyReport, PropertyCodec};
use crate::config::{ApplierConfig, PresetConfig};
use crate::error::PresetError;
use crate::preset::Preset;
use crate::reflect::{FieldError, FieldValue, PresetContainer, PresetTarget, Reflect, TypeRegistry};
use bevy_ecs::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Type name an entity reports when it is the direct target of a preset.
pub const ENTITY_TYPE: &str = "Entity";

type ComponentRef = fn(&World, Entity) -> Option<&dyn PresetTarget>;
type ComponentMut = fn(&mut World, Entity) -> Option<&mut dyn PresetTarget>;

#[derive(Clone, Copy)]
struct ComponentAccess {
    get: ComponentRef,
    get_mut: ComponentMut,
}

fn component_ref<T: Component + PresetTarget>(world: &World, entity: Entity) -> Option<&dyn PresetTarget> {
    world.get::<T>(entity).map(|component| component as &dyn PresetTarget)
}

fn component_mut<T: Component + PresetTarget>(world: &mut World, entity: Entity) -> Option<&mut dyn PresetTarget> {
    world.get_mut::<T>(entity).map(|component| component.into_inner() as &mut dyn PresetTarget)
}

#[derive(Resource)]
pub struct PresetRuntime {
    codec: PropertyCodec,
    applier_defaults: ApplierConfig,
    components: HashMap<String, ComponentAccess>,
}

impl PresetRuntime {
    pub fn new(codec: PropertyCodec) -> Self {
        Self { codec, applier_defaults: ApplierConfig::default(), components: HashMap::new() }
    }

    pub fn from_config(registry: TypeRegistry, config: &PresetConfig) -> Self {
        let mut runtime = Self::new(PropertyCodec::new(Arc::new(registry), config.codec.clone()));
        runtime.applier_defaults = config.applier.clone();
        runtime
    }

    pub fn codec(&self) -> &PropertyCodec {
        &self.codec
    }

    /// Exposes component `T` to presets whose target type is `type_name`.
    pub fn register_component<T: Component + PresetTarget>(&mut self, type_name: impl Into<String>) -> &mut Self {
        self.components
            .insert(type_name.into(), ComponentAccess { get: component_ref::<T>, get_mut: component_mut::<T> });
        self
    }

    pub fn register_reflected<T: Component + Reflect>(&mut self) -> &mut Self {
        let name = T::schema().name.into_owned();
        self.register_component::<T>(name)
    }

    /// An applier owned by `entity` with the configured defaults.
    pub fn new_applier(&self, entity: Entity) -> PresetApplier<Entity> {
        PresetApplier::from_config(entity, &self.applier_defaults)
    }

    /// Lends `entity` to `f` as a preset target, or `None` when it no longer exists.
    pub fn with_entity<R>(
        &self,
        world: &mut World,
        entity: Entity,
        f: impl FnOnce(Option<&mut dyn PresetTarget>) -> R,
    ) -> R {
        if !world.entities().contains(entity) {
            return f(None);
        }
        let mut entity_target = EntityTarget { world, entity, components: &self.components };
        let target: &mut dyn PresetTarget = &mut entity_target;
        f(Some(target))
    }
}

/// An entity seen as a container of its registered components.
pub struct EntityTarget<'w> {
    world: &'w mut World,
    entity: Entity,
    components: &'w HashMap<String, ComponentAccess>,
}

impl PresetTarget for EntityTarget<'_> {
    fn type_name(&self) -> &str {
        ENTITY_TYPE
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

impl PresetContainer for EntityTarget<'_> {
    fn sub_instance(&self, type_name: &str) -> Option<&dyn PresetTarget> {
        let components = self.components;
        let access = components.get(type_name)?;
        (access.get)(&*self.world, self.entity)
    }

    fn sub_instance_mut(&mut self, type_name: &str) -> Option<&mut dyn PresetTarget> {
        let components = self.components;
        let access = components.get(type_name)?;
        (access.get_mut)(&mut *self.world, self.entity)
    }
}

struct WorldTargets<'a> {
    world: &'a mut World,
    runtime: &'a PresetRuntime,
}

impl TargetResolver<Entity> for WorldTargets<'_> {
    fn with_target(
        &mut self,
        key: &Entity,
        apply: &mut dyn FnMut(Option<&mut dyn PresetTarget>) -> bool,
    ) -> bool {
        self.runtime.with_entity(self.world, *key, |target| apply(target))
    }
}

/// Applies a single preset to `entity` outside of any applier.
pub fn apply_preset(world: &mut World, entity: Entity, preset: &Preset) -> Result<ApplyReport, PresetError> {
    if !world.contains_resource::<PresetRuntime>() {
        return Err(PresetError::RuntimeMissing);
    }
    world.resource_scope(|world, runtime: Mut<PresetRuntime>| {
        let runtime = &*runtime;
        runtime.with_entity(world, entity, |target| preset.apply_checked(runtime.codec(), target))
    })
}

#[derive(Component, Clone)]
pub struct PresetApplierComponent {
    pub applier: PresetApplier<Entity>,
    awoken: bool,
    enable_pending: bool,
    started: bool,
}

impl PresetApplierComponent {
    pub fn new(applier: PresetApplier<Entity>) -> Self {
        Self { applier, awoken: false, enable_pending: false, started: false }
    }

    fn due_events(&mut self) -> Vec<ApplyEvents> {
        let mut due = Vec::new();
        if !self.awoken {
            self.awoken = true;
            self.enable_pending = true;
            due.push(ApplyEvents::AWAKE);
        }
        if self.enable_pending {
            self.enable_pending = false;
            due.push(ApplyEvents::ENABLE);
        }
        if !self.started {
            self.started = true;
            due.push(ApplyEvents::START);
        }
        due
    }
}

/// Fires the lifecycle events each applier has not seen yet: awake and enable
/// on the first run, enable again after [`notify_enabled`], and start once.
/// Returns how many presets were applied.
pub fn run_preset_appliers(world: &mut World) -> usize {
    fire_appliers(world, |slot| slot.due_events()).applied
}

/// Runs the import pass over every applier. Appliers that retire are removed
/// from their entity; returns how many were removed.
pub fn bake_imported_presets(world: &mut World) -> usize {
    fire_appliers(world, |_| vec![ApplyEvents::IMPORT]).retired
}

/// Queues an enable event for the applier on `entity`.
pub fn notify_enabled(world: &mut World, entity: Entity) -> bool {
    match world.get_mut::<PresetApplierComponent>(entity) {
        Some(mut slot) => {
            slot.enable_pending = true;
            true
        }
        None => false,
    }
}

#[derive(Default)]
struct FireSummary {
    applied: usize,
    retired: usize,
}

fn fire_appliers(
    world: &mut World,
    mut due: impl FnMut(&mut PresetApplierComponent) -> Vec<ApplyEvents>,
) -> FireSummary {
    if !world.contains_resource::<PresetRuntime>() {
        log::warn!("[preset] no PresetRuntime resource, appliers not run");
        return FireSummary::default();
    }
    world.resource_scope(|world, runtime: Mut<PresetRuntime>| {
        let runtime = &*runtime;
        let entities: Vec<Entity> = {
            let mut query = world.query_filtered::<Entity, With<PresetApplierComponent>>();
            query.iter(world).collect()
        };
        let mut summary = FireSummary::default();
        for entity in entities {
            let Some(mut slot) = world.get::<PresetApplierComponent>(entity).cloned() else {
                continue;
            };
            let mut retire = false;
            {
                let mut targets = WorldTargets { world: &mut *world, runtime };
                for event in due(&mut slot) {
                    match slot.applier.trigger(event, runtime.codec(), &mut targets) {
                        ApplierAction::Idle => {}
                        ApplierAction::Applied(report) => summary.applied += report.applied,
                        ApplierAction::Retire(report) => {
                            summary.applied += report.applied;
                            retire = true;
                            break;
                        }
                    }
                }
            }
            if retire {
                log::debug!("[preset] applier on {entity:?} retired");
                world.entity_mut(entity).remove::<PresetApplierComponent>();
                summary.retired += 1;
            } else if let Some(mut component) = world.get_mut::<PresetApplierComponent>(entity) {
                *component = slot;
            }
        }
        summary
    })
}
