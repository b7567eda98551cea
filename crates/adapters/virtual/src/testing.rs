//! In-memory fakes shared by the plugin tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use hmvirt_app::error::BridgeError;
use hmvirt_app::event_bus::InProcessEventBus;
use hmvirt_app::ports::DeviceStore;
use hmvirt_app::services::device_factory::DeviceFactory;
use hmvirt_app::services::device_registry::DeviceRegistry;
use hmvirt_domain::template::StaticTemplates;

use crate::scenes::SceneActivator;

#[derive(Default)]
pub struct InMemoryStore {
    documents: Mutex<HashMap<String, String>>,
}

impl DeviceStore for InMemoryStore {
    fn load(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<String>, BridgeError>> + Send {
        let result = self.documents.lock().unwrap().get(address).cloned();
        async { Ok(result) }
    }

    fn save(
        &self,
        address: &str,
        document: String,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.documents
            .lock()
            .unwrap()
            .insert(address.to_string(), document);
        async { Ok(()) }
    }

    fn delete(&self, address: &str) -> impl Future<Output = Result<bool, BridgeError>> + Send {
        let existed = self.documents.lock().unwrap().remove(address).is_some();
        async move { Ok(existed) }
    }

    fn list(&self) -> impl Future<Output = Result<Vec<String>, BridgeError>> + Send {
        let result = self.documents.lock().unwrap().keys().cloned().collect();
        async { Ok(result) }
    }
}

#[derive(Default)]
pub struct RecordingActivator {
    pub activated: Mutex<Vec<String>>,
}

impl SceneActivator for RecordingActivator {
    fn activate(&self, scene: &str) {
        self.activated.lock().unwrap().push(scene.to_string());
    }
}

pub fn factory() -> DeviceFactory<StaticTemplates> {
    DeviceFactory::new(
        StaticTemplates::new()
            .with("HM-RC-19", include_str!("../../../../devices/HM-RC-19.json"))
            .with(
                "HM-LC-Dim1T-Pl",
                include_str!("../../../../devices/HM-LC-Dim1T-Pl.json"),
            )
            .with(
                "HM-LC-Sw1-Pl",
                include_str!("../../../../devices/HM-LC-Sw1-Pl.json"),
            ),
    )
}

pub fn registry() -> (DeviceRegistry<Arc<InMemoryStore>>, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::default());
    let registry = DeviceRegistry::new(Arc::clone(&store), InProcessEventBus::new(16));
    (registry, store)
}
