use thiserror::Error;

/// Reasons a preset could not be applied. All of them are recoverable; the
/// boolean apply entry points collapse them to `false`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PresetError {
    #[error("no target object to apply the preset to")]
    NoTarget,
    #[error("preset has no target type")]
    Uninitialized,
    #[error("preset values have not been validated yet")]
    NotValidated,
    #[error("target type '{0}' is not registered (renamed or removed?)")]
    UnknownTargetType(String),
    #[error("'{target}' is not a '{expected}'")]
    NotApplicable { target: String, expected: String },
    #[error("'{container}' has no '{component}' to apply the preset to")]
    MissingSubInstance { container: String, component: String },
    #[error("preset runtime is not installed")]
    RuntimeMissing,
}
