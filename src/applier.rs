use crate::codec::PropertyCodec;
use crate::config::ApplierConfig;
use crate::preset::Preset;
use crate::reflect::PresetTarget;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

bitflags! {
    /// Lifecycle moments at which an applier runs its presets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ApplyEvents: u32 {
        /// The owner was constructed.
        const AWAKE = 1 << 0;
        /// The owner became active.
        const ENABLE = 1 << 1;
        /// The owner is about to run its first update.
        const START = 1 << 2;
        /// The owner is being baked by an import step.
        const IMPORT = 1 << 3;
    }
}

impl Default for ApplyEvents {
    fn default() -> Self {
        ApplyEvents::AWAKE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplierState {
    Pending,
    Applied,
    /// The host should detach the applier; further triggers are ignored.
    Retired,
}

#[derive(Debug, Clone)]
pub struct PresetBinding<K> {
    pub preset: Arc<Preset>,
    /// `None` targets the applier's owner.
    pub target: Option<K>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplierReport {
    pub applied: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplierAction {
    Idle,
    Applied(ApplierReport),
    /// Applied (if the event was subscribed) and now retired; the host must remove the applier.
    Retire(ApplierReport),
}

/// Host lookup from a target key to a live instance.
///
/// The instance is lent to `apply` for the duration of the call. A key that
/// no longer resolves is passed as `None`.
pub trait TargetResolver<K> {
    fn with_target(&mut self, key: &K, apply: &mut dyn FnMut(Option<&mut dyn PresetTarget>) -> bool) -> bool;
}

#[derive(Debug, Clone)]
pub struct PresetApplier<K> {
    owner: K,
    bindings: Vec<PresetBinding<K>>,
    apply_at: ApplyEvents,
    retire_after_import: bool,
    state: ApplierState,
}

impl<K: Clone> PresetApplier<K> {
    pub fn new(owner: K) -> Self {
        Self::from_config(owner, &ApplierConfig::default())
    }

    pub fn from_config(owner: K, config: &ApplierConfig) -> Self {
        Self {
            owner,
            bindings: Vec::new(),
            apply_at: config.apply_at,
            retire_after_import: config.retire_after_import,
            state: ApplierState::Pending,
        }
    }

    pub fn with_binding(mut self, preset: Arc<Preset>, target: Option<K>) -> Self {
        self.push_binding(preset, target);
        self
    }

    pub fn push_binding(&mut self, preset: Arc<Preset>, target: Option<K>) {
        self.bindings.push(PresetBinding { preset, target });
    }

    pub fn bindings(&self) -> &[PresetBinding<K>] {
        &self.bindings
    }

    pub fn owner(&self) -> &K {
        &self.owner
    }

    pub fn apply_at(&self) -> ApplyEvents {
        self.apply_at
    }

    pub fn set_apply_at(&mut self, events: ApplyEvents) {
        self.apply_at = events;
    }

    pub fn retire_after_import(&self) -> bool {
        self.retire_after_import
    }

    pub fn set_retire_after_import(&mut self, retire: bool) {
        self.retire_after_import = retire;
    }

    pub fn state(&self) -> ApplierState {
        self.state
    }

    pub fn dependency_keys(&self) -> Vec<String> {
        self.bindings.iter().map(|binding| binding.preset.dependency_key()).collect()
    }

    pub fn trigger(
        &mut self,
        event: ApplyEvents,
        codec: &PropertyCodec,
        targets: &mut dyn TargetResolver<K>,
    ) -> ApplierAction {
        if self.state == ApplierState::Retired {
            return ApplierAction::Idle;
        }
        let report = self.apply_at.intersects(event).then(|| self.apply(codec, targets));
        if event.contains(ApplyEvents::IMPORT) && self.retire_after_import {
            self.state = ApplierState::Retired;
            return ApplierAction::Retire(report.unwrap_or_default());
        }
        match report {
            Some(report) => ApplierAction::Applied(report),
            None => ApplierAction::Idle,
        }
    }

    /// Applies every binding in order. A failing binding does not stop the rest.
    pub fn apply(&mut self, codec: &PropertyCodec, targets: &mut dyn TargetResolver<K>) -> ApplierReport {
        let bindings = self.bindings.clone();
        let mut report = ApplierReport::default();
        for binding in &bindings {
            let key = binding.target.as_ref().unwrap_or(&self.owner);
            let preset = &binding.preset;
            let applied = targets
                .with_target(key, &mut |target: Option<&mut dyn PresetTarget>| preset.try_apply_to(codec, target));
            if applied {
                report.applied += 1;
            } else {
                report.failed += 1;
            }
        }
        if self.state == ApplierState::Pending {
            self.state = ApplierState::Applied;
        }
        report
    }
}
