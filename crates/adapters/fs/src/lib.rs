//! # hmvirt-adapter-fs
//!
//! Filesystem adapter.
//!
//! ## Responsibilities
//! - Implement [`TemplateSource`](hmvirt_domain::template::TemplateSource)
//!   over a directory of `<type>[_<owner>].json` device templates
//! - Implement [`DeviceStore`](hmvirt_app::ports::DeviceStore) as one
//!   `<address>.json` document per published device
//!
//! ## Dependency rule
//! Depends on `hmvirt-domain` and `hmvirt-app` (for port traits).

pub mod device_store;
pub mod error;
pub mod template_source;

pub use device_store::FsDeviceStore;
pub use error::FsError;
pub use template_source::FsTemplateSource;
