//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.
//! Template lookup is a domain-level port
//! ([`TemplateSource`](hmvirt_domain::template::TemplateSource)).

pub mod device_store;
pub mod event_bus;
pub mod plugin;

pub use device_store::DeviceStore;
pub use event_bus::EventPublisher;
pub use plugin::{Plugin, PluginContext};
