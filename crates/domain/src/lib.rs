//! # hmvirt-domain
//!
//! Pure device model for the hmvirt virtual device layer.
//!
//! ## Responsibilities
//! - Define **Parameters** (typed, range-checked values with controller metadata)
//! - Define **Parameter sets** (`MASTER`, `VALUES`, `LINK` groupings)
//! - Define **Channels** (addressable sub-units raising value change events)
//! - Define **Devices** (template or stored-document construction, event fan-out)
//! - Define the **document formats** for templates and persisted devices
//! - Contain all invariant enforcement and domain logic
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! Template lookup is expressed as the [`template::TemplateSource`] trait and
//! injected by the caller.

pub mod error;

pub mod channel;
pub mod device;
pub mod document;
pub mod event;
pub mod parameter;
pub mod paramset;
pub mod template;
