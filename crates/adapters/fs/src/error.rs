//! Filesystem-specific error type.

use std::path::PathBuf;

use hmvirt_app::error::BridgeError;

/// Errors originating from the filesystem adapter.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Reading or writing a file failed.
    #[error("io error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The name cannot be used as a file name.
    #[error("invalid file name {0:?}")]
    InvalidName(String),
}

impl FsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<FsError> for BridgeError {
    fn from(err: FsError) -> Self {
        Self::Storage(Box::new(err))
    }
}

/// Reject names that would escape the base directory.
pub(crate) fn check_name(name: &str) -> Result<(), FsError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}
