use crate::applier::ApplyEvents;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What to do when a stored leaf does not match the kind of the field it lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KindMismatchPolicy {
    /// Accept conversions that keep the stored value exact (integers within
    /// ±2^53 into float, integral float into integer or reference, null into a
    /// reference) and skip the rest.
    #[default]
    Widen,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default)]
    pub kind_mismatch: KindMismatchPolicy,
    #[serde(default = "CodecConfig::default_notify_listeners")]
    pub notify_listeners: bool,
    #[serde(default = "CodecConfig::default_warn_unsupported")]
    pub warn_unsupported: bool,
}

impl CodecConfig {
    const fn default_notify_listeners() -> bool {
        true
    }

    const fn default_warn_unsupported() -> bool {
        true
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            kind_mismatch: KindMismatchPolicy::default(),
            notify_listeners: Self::default_notify_listeners(),
            warn_unsupported: Self::default_warn_unsupported(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplierConfig {
    #[serde(default = "ApplierConfig::default_apply_at")]
    pub apply_at: ApplyEvents,
    #[serde(default)]
    pub retire_after_import: bool,
}

impl ApplierConfig {
    fn default_apply_at() -> ApplyEvents {
        ApplyEvents::AWAKE
    }
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self { apply_at: Self::default_apply_at(), retire_after_import: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetConfig {
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub applier: ApplierConfig,
}

impl PresetConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read preset config {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse preset config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Preset config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }
}
