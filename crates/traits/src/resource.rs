//! Read-only access to report assets (logos, signatures, stamps).
//!
//! Renderers never touch the filesystem directly; they ask a
//! [`ResourceProvider`] for bytes by key and decide themselves what a missing
//! asset means (a placeholder box in PDF output, a serialization error for
//! office documents).

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Failed to load resource '{key}': {message}")]
    LoadFailed { key: String, message: String },

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ResourceError {
    fn from(err: std::io::Error) -> Self {
        ResourceError::Io(err.to_string())
    }
}

pub type SharedResourceData = Arc<Vec<u8>>;

/// Source of asset bytes, shared across worker threads.
pub trait ResourceProvider: Send + Sync + Debug {
    /// Loads the asset stored under `key`.
    fn load(&self, key: &str) -> Result<SharedResourceData, ResourceError>;

    fn exists(&self, key: &str) -> bool;

    /// Human-readable provider name for log lines.
    fn name(&self) -> &'static str;
}

/// Assets registered up front; the default when no asset directory is configured.
#[derive(Debug, Default)]
pub struct InMemoryResourceProvider {
    resources: RwLock<HashMap<String, SharedResourceData>>,
}

impl InMemoryResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the asset under `key`.
    pub fn add(&self, key: impl Into<String>, data: Vec<u8>) -> Result<(), ResourceError> {
        let key = key.into();
        let mut resources = self.resources.write().map_err(|_| ResourceError::LoadFailed {
            key: key.clone(),
            message: "resource store lock poisoned".to_string(),
        })?;
        resources.insert(key, Arc::new(data));
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<SharedResourceData> {
        self.resources.write().ok()?.remove(key)
    }

    pub fn len(&self) -> usize {
        self.resources.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for InMemoryResourceProvider {
    fn load(&self, key: &str) -> Result<SharedResourceData, ResourceError> {
        let resources = self.resources.read().map_err(|_| ResourceError::LoadFailed {
            key: key.to_string(),
            message: "resource store lock poisoned".to_string(),
        })?;
        resources
            .get(key)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> bool {
        self.resources
            .read()
            .map(|r| r.contains_key(key))
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "InMemoryResourceProvider"
    }
}
