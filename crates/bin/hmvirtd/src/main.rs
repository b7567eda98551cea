//! # hmvirtd
//!
//! Composition root that wires the adapters together and runs the bridge.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize logging
//! - Construct the template source and the device store (adapters)
//! - Construct the registry and event bus, injecting the store via its port
//! - Run the plugins' lifecycle: setup, wait for shutdown, teardown
//! - Persist every published device on graceful shutdown (SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use hmvirt_adapter_fs::{FsDeviceStore, FsTemplateSource};
use hmvirt_adapter_virtual::VirtualPlugin;
use hmvirt_adapter_virtual::scenes::LoggingActivator;
use hmvirt_app::bridge_event::BridgeEvent;
use hmvirt_app::event_bus::InProcessEventBus;
use hmvirt_app::ports::Plugin;
use hmvirt_app::services::device_factory::DeviceFactory;
use hmvirt_app::services::device_registry::DeviceRegistry;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    // Templates
    let templates = FsTemplateSource::new(&config.paths.devices_dir);
    match templates.names() {
        Ok(names) => tracing::info!(dir = ?templates.dir(), count = names.len(), "templates found"),
        Err(err) => tracing::warn!(%err, "cannot list device templates"),
    }
    let factory = DeviceFactory::new(templates);

    // Storage
    let store = FsDeviceStore::open(&config.paths.storage_dir).await?;

    // Event bus
    let event_bus = InProcessEventBus::new(config.bus.capacity);
    tokio::spawn(log_events(event_bus.subscribe()));

    let registry = DeviceRegistry::new(store, event_bus);

    // Plugins
    let mut plugin = VirtualPlugin::new(config.virtual_plugin, &factory, LoggingActivator);
    if let Err(err) = plugin.setup(&registry).await {
        tracing::error!(%err, plugin = plugin.name(), "plugin setup failed");
    }
    let published = registry.device_descriptions()?.len();
    tracing::info!(devices = registry.len(), descriptions = published, "hmvirtd running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    if let Err(err) = plugin.teardown(&registry).await {
        tracing::warn!(%err, plugin = plugin.name(), "plugin teardown failed");
    }
    let written = registry.persist_all().await;
    tracing::info!(written, "devices persisted");

    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<BridgeEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::debug!(
                kind = ?event.kind,
                channel = %event.channel,
                name = %event.name,
                value = %event.new_value,
                upstream = event.is_upstream(),
                "device event"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event log lagging behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
