//! Error types for array encoding

use thiserror::Error;

/// Array encoder error types
#[derive(Error, Debug)]
pub enum Array2ShError {
    /// Invalid encoding order
    #[error("Invalid encoding order: {0} (supported: 1-{max})", max = crate::MAX_SH_ORDER)]
    InvalidOrder(usize),

    /// Invalid sensor count
    #[error("Invalid sensor count: {0} (supported: 1-{max})", max = crate::MAX_NUM_SENSORS)]
    InvalidSensorCount(usize),

    /// Unknown enumeration value (preset, array type, ...)
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    /// Filter design failed
    #[error("Filter design failed: {0}")]
    DesignFailed(String),

    /// Settings (de)serialization error
    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for array encoder operations
pub type Array2ShResult<T> = Result<T, Array2ShError>;
