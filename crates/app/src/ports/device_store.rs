//! Storage port for persisted device documents.

use std::future::Future;

use crate::error::BridgeError;

/// Keeps the serialized form of each published device, keyed by address.
///
/// Documents are opaque strings produced by
/// [`Device::save_persistent`](hmvirt_domain::device::Device::save_persistent).
pub trait DeviceStore {
    /// The stored document for `address`, if any.
    fn load(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<String>, BridgeError>> + Send;

    /// Create or replace the document for `address`.
    fn save(
        &self,
        address: &str,
        document: String,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;

    /// Remove the document for `address`. Returns whether one existed.
    fn delete(&self, address: &str) -> impl Future<Output = Result<bool, BridgeError>> + Send;

    /// Addresses of all stored documents.
    fn list(&self) -> impl Future<Output = Result<Vec<String>, BridgeError>> + Send;
}

impl<T: DeviceStore + Send + Sync> DeviceStore for std::sync::Arc<T> {
    fn load(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<String>, BridgeError>> + Send {
        (**self).load(address)
    }

    fn save(
        &self,
        address: &str,
        document: String,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).save(address, document)
    }

    fn delete(&self, address: &str) -> impl Future<Output = Result<bool, BridgeError>> + Send {
        (**self).delete(address)
    }

    fn list(&self) -> impl Future<Output = Result<Vec<String>, BridgeError>> + Send {
        (**self).list()
    }
}
