//! # hmvirt-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `DeviceStore`: load, save, delete and list persisted device documents
//!   - `EventPublisher`: hand device events to the outside world
//!   - `Plugin` / `PluginContext`: lifecycle of device backends
//! - Define **driving/inbound** use-case structs:
//!   - `DeviceFactory`: build devices from templates or stored documents
//!   - `DeviceRegistry`: publish, persist, route writes, list descriptions
//! - Provide the thread-safe [`shared_device::SharedDevice`] handle
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `hmvirt-domain` only (plus `tokio::sync` for channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod bridge_event;
pub mod error;
pub mod event_bus;
pub mod ports;
pub mod services;
pub mod shared_device;
