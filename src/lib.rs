pub mod applier;
pub mod codec;
pub mod config;
pub mod diff;
#[cfg(feature = "ecs")]
pub mod ecs;
pub mod error;
pub mod key_path;
pub mod preset;
pub mod references;
pub mod reflect;

pub use applier::{ApplierAction, ApplierState, ApplyEvents, PresetApplier, PresetBinding, TargetResolver};
pub use codec::{ApplyReport, CaptureReport, PropertyCodec};
pub use config::{ApplierConfig, CodecConfig, KindMismatchPolicy, PresetConfig};
pub use diff::{modified_paths, IncludedPaths};
pub use error::PresetError;
pub use key_path::{KeyPathStore, Leaf};
pub use preset::{Preset, PresetState};
pub use references::{ObjectHandle, ObjectReferences, NULL_REFERENCE};
pub use reflect::{
    FieldError, FieldKind, FieldValue, PresetContainer, PresetTarget, Reflect, TypeRegistry, TypeRole, TypeSchema,
};
