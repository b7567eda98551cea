//! Error types for device construction and parameter access.
//!
//! Each layer defines its own typed errors and converts via `#[from]`.
//! Public construction entry points on [`Device`](crate::device::Device)
//! log these and report a plain success flag; the `try_*` variants hand
//! them to the caller.

/// Errors raised by the device model.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// No template exists for the requested device type.
    #[error("no template found for device type {device_type}")]
    TemplateNotFound { device_type: String },

    /// The template source could not be read.
    #[error("failed to read template for device type {device_type}")]
    TemplateRead {
        device_type: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A template or stored document is not valid JSON for its schema.
    #[error("malformed device document")]
    Parse(#[from] serde_json::Error),

    /// A parameter record names a type outside the supported set.
    #[error("unknown parameter type {0}")]
    UnknownParameterType(String),

    /// Two parameters with the same name in one parameter set.
    #[error("duplicate parameter {name} in paramset {paramset}")]
    DuplicateParameter { paramset: String, name: String },

    /// Two channels resolving to the same address.
    #[error("duplicate channel address {0}")]
    DuplicateChannel(String),

    /// A stored document lacks one of the fields required to restore it.
    #[error("stored device data is missing {0}")]
    MissingField(&'static str),

    /// No channel with the given address.
    #[error("channel {0} not found")]
    ChannelNotFound(String),

    /// No parameter with the given name on the addressed channel.
    #[error("parameter {name} not found on channel {channel}")]
    ParameterNotFound { channel: String, name: String },

    /// The value cannot be coerced to the parameter's type.
    #[error("value rejected by parameter {0}")]
    InvalidValue(String),

    /// The device has not completed construction.
    #[error("device is not initialized")]
    NotInitialized,

    /// The device was already built through one of the construction paths.
    #[error("device is already initialized")]
    AlreadyInitialized,
}
