//! Assets served from a provisioned directory.
//!
//! Keys are relative paths. Anything that would resolve outside the asset
//! directory (absolute keys, `..` components, symlinks pointing elsewhere) is
//! reported as not found.

use log::debug;
use quire_traits::{ResourceError, ResourceProvider, SharedResourceData};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub struct FilesystemResourceProvider {
    root: PathBuf,
    canonical_root: Option<PathBuf>,
}

impl FilesystemResourceProvider {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let canonical_root = root.canonicalize().ok();
        Self { root, canonical_root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        if relative.is_absolute() {
            return None;
        }
        if relative.components().any(|c| matches!(c, Component::ParentDir)) {
            return None;
        }

        let full = self.root.join(relative);
        match (full.canonicalize(), &self.canonical_root) {
            (Ok(canonical), Some(root)) if canonical.starts_with(root) => Some(canonical),
            (Ok(_), Some(_)) => None,
            _ => Some(full),
        }
    }
}

impl ResourceProvider for FilesystemResourceProvider {
    fn load(&self, key: &str) -> Result<SharedResourceData, ResourceError> {
        let path = self.resolve(key).ok_or_else(|| {
            debug!("Rejected asset key outside {}: {}", self.root.display(), key);
            ResourceError::NotFound(key.to_string())
        })?;

        std::fs::read(&path).map(Arc::new).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResourceError::NotFound(key.to_string())
            } else {
                ResourceError::LoadFailed { key: key.to_string(), message: e.to_string() }
            }
        })
    }

    fn exists(&self, key: &str) -> bool {
        self.resolve(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "FilesystemResourceProvider"
    }
}
