//! Transient storage for finished PDFs.
//!
//! Artifacts are immutable and shared as `Arc`s: a reader holding one keeps
//! the bytes alive even while the store drops its entry. Removal leaves a
//! tombstone so a later lookup can say "expired" rather than "missing".

use crate::jobs::JobId;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

/// When a stored artifact is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Kept until its TTL passes.
    #[default]
    Ttl,
    /// Dropped as soon as the caller acknowledges retrieval; the TTL still
    /// applies to artifacts that are never acknowledged.
    Acknowledge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    /// Lowercase hex SHA-256 of `bytes`.
    pub sha256: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub file_name: String,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, title: &str, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            sha256: format!("{:x}", Sha256::digest(&bytes)),
            bytes,
            created_at,
            expires_at: created_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            file_name: download_name(title),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            file_name: self.file_name.clone(),
            size: self.bytes.len(),
            sha256: self.sha256.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// `Quote Double Oak` → `quote-double-oak.pdf`.
pub fn download_name(title: &str) -> String {
    let stem = slug::slugify(title);
    if stem.is_empty() { "report.pdf".to_string() } else { format!("{}.pdf", stem) }
}

/// What `status` reports about an artifact without handing out its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub file_name: String,
    pub size: usize,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Present(Arc<Artifact>),
    Expired,
    Missing,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("An artifact for job {0} was already stored")]
    AlreadyExists(JobId),
}

#[derive(Debug, Default)]
struct Entries {
    live: HashMap<JobId, Arc<Artifact>>,
    expired: HashSet<JobId>,
}

#[derive(Debug, Default)]
pub struct ArtifactStore {
    entries: RwLock<Entries>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the artifact of `id`. An id is stored at most once, even after
    /// its artifact expired.
    pub fn insert(&self, id: JobId, artifact: Artifact) -> Result<Arc<Artifact>, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.live.contains_key(&id) || entries.expired.contains(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        let artifact = Arc::new(artifact);
        entries.live.insert(id, Arc::clone(&artifact));
        Ok(artifact)
    }

    pub fn get(&self, id: JobId) -> Lookup {
        self.get_at(id, Utc::now())
    }

    pub fn get_at(&self, id: JobId, now: DateTime<Utc>) -> Lookup {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.live.get(&id) {
            Some(artifact) if !artifact.is_expired_at(now) => Lookup::Present(Arc::clone(artifact)),
            Some(_) => Lookup::Expired,
            None if entries.expired.contains(&id) => Lookup::Expired,
            None => Lookup::Missing,
        }
    }

    /// Drops the artifact of `id`, leaving a tombstone.
    pub fn remove(&self, id: JobId) -> Option<Arc<Artifact>> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let removed = entries.live.remove(&id);
        if removed.is_some() {
            entries.expired.insert(id);
        }
        removed
    }

    /// Drops every artifact past its expiry and returns their ids.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let due: Vec<JobId> = entries
            .live
            .iter()
            .filter(|(_, artifact)| artifact.is_expired_at(now))
            .map(|(id, _)| *id)
            .collect();
        for id in &due {
            entries.live.remove(id);
            entries.expired.insert(*id);
        }
        if !due.is_empty() {
            debug!("Swept {} expired artifact(s)", due.len());
        }
        due
    }

    /// Forgets everything about `id`, tombstone included.
    pub fn forget(&self, id: JobId) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.live.remove(&id);
        entries.expired.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
