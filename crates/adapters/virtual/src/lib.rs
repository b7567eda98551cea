//! # hmvirt-adapter-virtual
//!
//! Virtual plugin that publishes simulated devices to the controller.
//!
//! ## Provided devices
//!
//! | Device | Type | Address | Behaviour |
//! |--------|------|---------|-----------|
//! | Scene remote | `HM-RC-19` | `HMV_<instance>0<n>` | `PRESS_SHORT` on a key activates its scene |
//! | Dimmer | `HM-LC-Dim1T-Pl` | `HMV_DIM<instance>_<name>` | Applies `LEVEL`, reports `WORKING` |
//! | Switch | `HM-LC-Sw1-Pl` | `HMV_SW<instance>_<name>` | Applies `STATE`, reports `WORKING` |
//!
//! ## Dependency rule
//!
//! Depends on `hmvirt-app` (port traits) and `hmvirt-domain` only.

pub mod actuators;
pub mod config;
pub mod scenes;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use hmvirt_app::error::BridgeError;
use hmvirt_app::ports::{Plugin, PluginContext};
use hmvirt_app::services::device_factory::DeviceFactory;
use hmvirt_domain::template::TemplateSource;

use actuators::{ActuatorKind, VirtualActuator};
use config::VirtualConfig;
use scenes::{MappedScene, SceneActivator};

/// Owner name used for owner-scoped templates (`<type>_virtual.json`).
pub const OWNER: &str = "virtual";

/// Virtual plugin publishing scene remotes and simulated actuators.
pub struct VirtualPlugin<T, A> {
    config: VirtualConfig,
    factory: DeviceFactory<T>,
    activator: Arc<A>,
    scenes: Vec<MappedScene>,
    actuators: Vec<VirtualActuator>,
}

impl<T, A> VirtualPlugin<T, A>
where
    T: TemplateSource + Clone,
{
    /// Create the plugin. `factory` is scoped to the plugin's owner name.
    #[must_use]
    pub fn new(config: VirtualConfig, factory: &DeviceFactory<T>, activator: A) -> Self {
        Self {
            config,
            factory: factory.for_owner(OWNER),
            activator: Arc::new(activator),
            scenes: Vec::new(),
            actuators: Vec::new(),
        }
    }
}

impl<T, A> VirtualPlugin<T, A> {
    /// Scenes and the remote keys they were published on.
    #[must_use]
    pub fn scenes(&self) -> &[MappedScene] {
        &self.scenes
    }

    #[must_use]
    pub fn actuators(&self) -> &[VirtualActuator] {
        &self.actuators
    }
}

impl<T, A> Plugin for VirtualPlugin<T, A>
where
    T: TemplateSource + Send + Sync,
    A: SceneActivator,
{
    fn name(&self) -> &'static str {
        "virtual"
    }

    async fn setup(&mut self, ctx: &impl PluginContext) -> Result<(), BridgeError> {
        if !self.config.enabled {
            tracing::info!("virtual plugin disabled");
            return Ok(());
        }
        let instance = self.config.instance.clone();

        self.scenes = scenes::publish(
            ctx,
            &self.factory,
            &instance,
            &self.config.scenes,
            &self.activator,
        )
        .await?;

        let wanted = self
            .config
            .dimmers
            .iter()
            .map(|name| (ActuatorKind::Dimmer, name))
            .chain(
                self.config
                    .switches
                    .iter()
                    .map(|name| (ActuatorKind::Switch, name)),
            );
        let mut actuators = Vec::new();
        for (kind, name) in wanted {
            actuators.push(VirtualActuator::publish(ctx, &self.factory, kind, &instance, name).await?);
        }
        self.actuators = actuators;

        tracing::info!(
            scenes = self.scenes.len(),
            actuators = self.actuators.len(),
            "virtual plugin ready"
        );
        Ok(())
    }

    async fn teardown(&mut self, ctx: &impl PluginContext) -> Result<(), BridgeError> {
        for actuator in &self.actuators {
            if let Err(err) = ctx.persist(actuator.address()).await {
                tracing::warn!(%err, address = %actuator.address(), "failed to persist actuator");
            }
        }
        self.actuators.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingActivator, factory, registry};
    use hmvirt_app::ports::DeviceStore;
    use hmvirt_domain::parameter::ParamValue;

    fn config() -> VirtualConfig {
        VirtualConfig {
            scenes: vec!["Evening".to_string(), "Movie".to_string()],
            dimmers: vec!["Living Room".to_string()],
            switches: vec!["Kitchen".to_string()],
            ..VirtualConfig::default()
        }
    }

    #[tokio::test]
    async fn should_return_virtual_as_name() {
        let plugin = VirtualPlugin::new(config(), &factory(), RecordingActivator::default());
        assert_eq!(plugin.name(), "virtual");
    }

    #[tokio::test]
    async fn should_publish_configured_devices_on_setup() {
        let (registry, _store) = registry();
        let mut plugin = VirtualPlugin::new(config(), &factory(), RecordingActivator::default());

        plugin.setup(&registry).await.unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(plugin.scenes().len(), 2);
        assert_eq!(plugin.actuators().len(), 2);
        assert!(registry.device("HMV_000").is_some());
        assert!(registry.device("HMV_DIM0_Living_Room").is_some());
        assert!(registry.device("HMV_SW0_Kitchen").is_some());
    }

    #[tokio::test]
    async fn should_publish_nothing_when_disabled() {
        let (registry, _store) = registry();
        let config = VirtualConfig {
            enabled: false,
            ..config()
        };
        let mut plugin = VirtualPlugin::new(config, &factory(), RecordingActivator::default());

        plugin.setup(&registry).await.unwrap();

        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn should_activate_scene_through_injected_activator() {
        let (registry, _store) = registry();
        let activator = Arc::new(RecordingActivator::default());
        let mut plugin = VirtualPlugin::new(config(), &factory(), Arc::clone(&activator));
        plugin.setup(&registry).await.unwrap();

        registry.set_value("HMV_000:2", "PRESS_SHORT", true).unwrap();

        assert_eq!(*activator.activated.lock().unwrap(), vec!["Movie"]);
    }

    #[tokio::test]
    async fn should_persist_actuators_on_teardown() {
        let (registry, store) = registry();
        let mut plugin = VirtualPlugin::new(config(), &factory(), RecordingActivator::default());
        plugin.setup(&registry).await.unwrap();
        registry
            .set_value("HMV_DIM0_Living_Room:1", "LEVEL", 0.4)
            .unwrap();

        plugin.teardown(&registry).await.unwrap();

        let stored = store.load("HMV_DIM0_Living_Room").await.unwrap().unwrap();
        let restored = factory()
            .restore_or_create(Some(&stored), "HM-LC-Dim1T-Pl", "HMV_DIM0_Living_Room")
            .unwrap();
        assert_eq!(
            restored.get_value("HMV_DIM0_Living_Room:1", "LEVEL"),
            Some(&ParamValue::Float(0.4))
        );
        assert!(plugin.actuators().is_empty());
    }
}
