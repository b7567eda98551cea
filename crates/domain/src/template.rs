//! Device template lookup.
//!
//! The device model never touches the filesystem itself. A
//! [`TemplateSource`] is injected and asked for templates by name; the
//! owner-scoped name `<type>_<owner>` is tried before the shared `<type>`.

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use crate::error::DeviceError;

/// Boxed error returned by template sources.
pub type SourceError = Box<dyn Error + Send + Sync>;

/// Provider of raw device template documents.
pub trait TemplateSource {
    /// Raw JSON of the template called `name` (file stem, e.g. `HM-RC-19`),
    /// or `None` when no such template exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the template exists but cannot be read.
    fn read_template(&self, name: &str) -> Result<Option<String>, SourceError>;
}

impl<T: TemplateSource + ?Sized> TemplateSource for &T {
    fn read_template(&self, name: &str) -> Result<Option<String>, SourceError> {
        (**self).read_template(name)
    }
}

impl<T: TemplateSource + ?Sized> TemplateSource for Arc<T> {
    fn read_template(&self, name: &str) -> Result<Option<String>, SourceError> {
        (**self).read_template(name)
    }
}

/// A template that has been located, with the name it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    pub name: String,
    pub content: String,
}

/// Find the template for `device_type`, preferring the owner-scoped override.
///
/// # Errors
///
/// Returns [`DeviceError::TemplateNotFound`] when neither name exists, or
/// [`DeviceError::TemplateRead`] when the source fails.
pub fn resolve<S: TemplateSource + ?Sized>(
    source: &S,
    device_type: &str,
    owner: Option<&str>,
) -> Result<ResolvedTemplate, DeviceError> {
    let read = |name: &str| {
        source
            .read_template(name)
            .map_err(|source| DeviceError::TemplateRead {
                device_type: device_type.to_string(),
                source,
            })
    };

    if let Some(owner) = owner {
        let name = format!("{device_type}_{owner}");
        tracing::debug!(%name, "looking for owner template");
        if let Some(content) = read(&name)? {
            return Ok(ResolvedTemplate { name, content });
        }
    }

    tracing::debug!(%device_type, "looking for shared template");
    match read(device_type)? {
        Some(content) => Ok(ResolvedTemplate {
            name: device_type.to_string(),
            content,
        }),
        None => Err(DeviceError::TemplateNotFound {
            device_type: device_type.to_string(),
        }),
    }
}

/// In-memory template source.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplates {
    templates: HashMap<String, String>,
}

impl StaticTemplates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under `name`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(name, content);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.templates.insert(name.into(), content.into());
    }
}

impl TemplateSource for StaticTemplates {
    fn read_template(&self, name: &str) -> Result<Option<String>, SourceError> {
        Ok(self.templates.get(name).cloned())
    }
}
