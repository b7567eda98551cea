//! Device templates read from a directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use hmvirt_domain::template::{SourceError, TemplateSource};

use crate::error::{FsError, check_name};

/// Reads `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FsTemplateSource {
    dir: PathBuf,
}

impl FsTemplateSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of all templates in the directory, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`FsError::Io`] when the directory cannot be listed.
    pub fn names(&self) -> Result<Vec<String>, FsError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| FsError::io(&self.dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| FsError::io(&self.dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl TemplateSource for FsTemplateSource {
    fn read_template(&self, name: &str) -> Result<Option<String>, SourceError> {
        check_name(name)?;
        let path = self.dir.join(format!("{name}.json"));
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                tracing::debug!(?path, "template loaded");
                Ok(Some(content))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(FsError::io(path, err).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmvirt_domain::device::Device;

    const SWITCH: &str = r#"{"type": "HM-LC-Sw1-Pl", "channels": [{"adress": 1, "type": "SWITCH"}], "paramsets": []}"#;

    fn dir_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn should_read_existing_template() {
        let dir = dir_with(&[("HM-LC-Sw1-Pl.json", SWITCH)]);
        let source = FsTemplateSource::new(dir.path());
        assert_eq!(
            source.read_template("HM-LC-Sw1-Pl").unwrap().as_deref(),
            Some(SWITCH)
        );
    }

    #[test]
    fn should_report_missing_template_as_none() {
        let dir = dir_with(&[]);
        let source = FsTemplateSource::new(dir.path());
        assert!(source.read_template("HM-NOPE").unwrap().is_none());
    }

    #[test]
    fn should_reject_path_traversal() {
        let dir = dir_with(&[]);
        let source = FsTemplateSource::new(dir.path());
        assert!(source.read_template("../secrets").is_err());
    }

    #[test]
    fn should_list_template_names() {
        let dir = dir_with(&[
            ("HM-LC-Sw1-Pl.json", SWITCH),
            ("HM-LC-Sw1-Pl_hue.json", SWITCH),
            ("README.md", "docs"),
        ]);
        let source = FsTemplateSource::new(dir.path());
        assert_eq!(
            source.names().unwrap(),
            vec!["HM-LC-Sw1-Pl", "HM-LC-Sw1-Pl_hue"]
        );
    }

    #[test]
    fn should_build_device_with_owner_override_from_disk() {
        let dir = dir_with(&[
            ("HM-LC-Sw1-Pl.json", SWITCH),
            (
                "HM-LC-Sw1-Pl_hue.json",
                r#"{"type": "HM-LC-Sw1-Pl", "channels": [{"adress": [1, 2], "type": "SWITCH"}], "paramsets": []}"#,
            ),
        ]);
        let source = FsTemplateSource::new(dir.path());

        let mut shared = Device::new(None);
        assert!(shared.init_with_type(&source, "HM-LC-Sw1-Pl", "SW01"));
        let mut owned = Device::new(Some("hue"));
        assert!(owned.init_with_type(&source, "HM-LC-Sw1-Pl", "SW02"));

        assert_eq!(shared.channels().count(), 1);
        assert_eq!(owned.channels().count(), 2);
    }

    #[test]
    fn should_leave_device_uninitialized_on_malformed_file() {
        let dir = dir_with(&[("HM-LC-Sw1-Pl.json", "{ nope")]);
        let source = FsTemplateSource::new(dir.path());
        let mut device = Device::new(None);
        assert!(!device.init_with_type(&source, "HM-LC-Sw1-Pl", "SW01"));
        assert!(!device.is_initialized());
    }
}
