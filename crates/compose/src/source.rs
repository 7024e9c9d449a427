//! Template lookup.

use crate::error::TemplateError;
use crate::template::TemplateDef;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Where the composer finds template definitions by id.
pub trait TemplateSource: Send + Sync + Debug {
    fn get(&self, id: &str) -> Result<Arc<TemplateDef>, TemplateError>;

    /// All known template ids, sorted.
    fn ids(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct InMemoryTemplateSource {
    templates: RwLock<BTreeMap<String, Arc<TemplateDef>>>,
}

impl InMemoryTemplateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template: TemplateDef) {
        let mut templates = self.templates.write().unwrap_or_else(|e| e.into_inner());
        templates.insert(template.id.clone(), Arc::new(template));
    }

    /// Parses and registers a JSON template definition.
    pub fn insert_json(&self, json: &str) -> Result<(), TemplateError> {
        let template = TemplateDef::from_json(json).map_err(|e| TemplateError::Invalid {
            id: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        self.insert(template);
        Ok(())
    }
}

impl TemplateSource for InMemoryTemplateSource {
    fn get(&self, id: &str) -> Result<Arc<TemplateDef>, TemplateError> {
        let templates = self.templates.read().unwrap_or_else(|e| e.into_inner());
        templates
            .get(id)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    fn ids(&self) -> Vec<String> {
        let templates = self.templates.read().unwrap_or_else(|e| e.into_inner());
        templates.keys().cloned().collect()
    }
}

/// Every `*.json` file of a directory, parsed once at construction.
#[derive(Debug)]
pub struct DirectoryTemplateSource {
    dir: PathBuf,
    inner: InMemoryTemplateSource,
}

impl DirectoryTemplateSource {
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, TemplateError> {
        let dir = dir.as_ref().to_path_buf();
        let source = Self { dir, inner: InMemoryTemplateSource::new() };
        source.reload()?;
        Ok(source)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Re-reads the directory, replacing templates whose files changed.
    pub fn reload(&self) -> Result<usize, TemplateError> {
        let io_error = |message: String| TemplateError::Invalid {
            id: self.dir.display().to_string(),
            message,
        };
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| io_error(format!("failed to read template directory: {}", e)))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in &paths {
            let text = std::fs::read_to_string(path)
                .map_err(|e| io_error(format!("failed to read {}: {}", path.display(), e)))?;
            let template = TemplateDef::from_json(&text).map_err(|e| TemplateError::Invalid {
                id: path.display().to_string(),
                message: e.to_string(),
            })?;

            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if stem != template.id {
                warn!(
                    "Template file {} declares id '{}'; it is registered under the id",
                    path.display(),
                    template.id
                );
            }
            debug!("Loaded template '{}' from {}", template.id, path.display());
            self.inner.insert(template);
        }

        if paths.is_empty() {
            warn!("No templates found in {}", self.dir.display());
        } else {
            info!("Loaded {} templates from {}", paths.len(), self.dir.display());
        }
        Ok(paths.len())
    }
}

impl TemplateSource for DirectoryTemplateSource {
    fn get(&self, id: &str) -> Result<Arc<TemplateDef>, TemplateError> {
        self.inner.get(id)
    }

    fn ids(&self) -> Vec<String> {
        self.inner.ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MINIMAL: &str = r#"{ "id": "minimal", "body": [] }"#;

    #[test]
    fn in_memory_lookup() {
        let source = InMemoryTemplateSource::new();
        source.insert_json(MINIMAL).unwrap();
        assert_eq!(source.get("minimal").unwrap().id, "minimal");
        assert_eq!(source.get("other").unwrap_err(), TemplateError::NotFound("other".into()));
        assert_eq!(source.ids(), vec!["minimal".to_string()]);
    }

    #[test]
    fn directory_source_loads_json_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("minimal.json"), MINIMAL).unwrap();
        fs::write(dir.path().join("notes.txt"), "not a template").unwrap();
        fs::write(dir.path().join("b.json"), r#"{ "id": "invoice", "body": [] }"#).unwrap();

        let source = DirectoryTemplateSource::load(dir.path()).unwrap();
        assert_eq!(source.ids(), vec!["invoice".to_string(), "minimal".to_string()]);
    }

    #[test]
    fn directory_source_reports_malformed_templates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ \"id\": ").unwrap();
        assert!(matches!(
            DirectoryTemplateSource::load(dir.path()),
            Err(TemplateError::Invalid { .. })
        ));
    }
}
