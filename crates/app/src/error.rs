//! Errors raised by the application layer.

use hmvirt_domain::error::DeviceError;

/// Errors surfaced by the registry, the factory and the ports.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The device model rejected the operation.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A storage adapter failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// No registered device owns the address.
    #[error("device {address} not found")]
    NotFound { address: String },

    /// The device never completed construction and cannot be published.
    #[error("device {address} is not initialized")]
    NotInitialized { address: String },

    /// The device is borrowed for writing further up the current call stack.
    #[error("device is busy")]
    Busy,
}

impl BridgeError {
    /// Wrap any adapter error as [`BridgeError::Storage`].
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_device_errors() {
        let err: BridgeError = DeviceError::NotInitialized.into();
        assert!(matches!(err, BridgeError::Device(DeviceError::NotInitialized)));
        assert_eq!(err.to_string(), "device is not initialized");
    }

    #[test]
    fn should_display_not_found() {
        let err = BridgeError::NotFound {
            address: "HMV_001".to_string(),
        };
        assert_eq!(err.to_string(), "device HMV_001 not found");
    }

    #[test]
    fn should_wrap_storage_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = BridgeError::storage(io);
        assert_eq!(err.to_string(), "storage error: read-only");
    }
}
