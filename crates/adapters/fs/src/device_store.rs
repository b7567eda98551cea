//! Device documents stored as `<dir>/<address>.json`.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use hmvirt_app::error::BridgeError;
use hmvirt_app::ports::DeviceStore;

use crate::error::{FsError, check_name};

/// JSON-file implementation of [`DeviceStore`].
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash never leaves a truncated document behind.
#[derive(Debug, Clone)]
pub struct FsDeviceStore {
    dir: PathBuf,
}

impl FsDeviceStore {
    /// Open the store, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::Io`] when the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, FsError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FsError::io(&dir, e))?;
        tracing::debug!(?dir, "device store opened");
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, address: &str) -> Result<PathBuf, FsError> {
        check_name(address)?;
        Ok(self.dir.join(format!("{address}.json")))
    }

    async fn read(&self, address: &str) -> Result<Option<String>, FsError> {
        let path = self.path(address)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(document) => Ok(Some(document)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(FsError::io(path, err)),
        }
    }

    async fn write(&self, address: &str, document: String) -> Result<(), FsError> {
        let path = self.path(address)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, document)
            .await
            .map_err(|e| FsError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| FsError::io(&path, e))?;
        tracing::debug!(?path, "device document written");
        Ok(())
    }

    async fn remove(&self, address: &str) -> Result<bool, FsError> {
        let path = self.path(address)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(FsError::io(path, err)),
        }
    }

    async fn addresses(&self) -> Result<Vec<String>, FsError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| FsError::io(&self.dir, e))?;
        let mut addresses = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FsError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                addresses.push(stem.to_string());
            }
        }
        addresses.sort();
        Ok(addresses)
    }
}

impl DeviceStore for FsDeviceStore {
    fn load(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<String>, BridgeError>> + Send {
        async move { Ok(self.read(address).await?) }
    }

    fn save(
        &self,
        address: &str,
        document: String,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        async move { Ok(self.write(address, document).await?) }
    }

    fn delete(&self, address: &str) -> impl Future<Output = Result<bool, BridgeError>> + Send {
        async move { Ok(self.remove(address).await?) }
    }

    fn list(&self) -> impl Future<Output = Result<Vec<String>, BridgeError>> + Send {
        async move { Ok(self.addresses().await?) }
    }
}
