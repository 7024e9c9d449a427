//! The process contract between the broker and a conversion engine.
//!
//! One engine instance serves one slot. The broker guarantees that calls on an
//! instance never overlap, so implementations may keep per-instance state
//! (a user profile, a running process) without their own locking.

use crate::error::EngineFailure;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

pub type SlotId = usize;

#[async_trait]
pub trait ConversionEngine: Send + Debug {
    /// Brings the instance up. Called once before first use and after every
    /// [`terminate`](ConversionEngine::terminate).
    async fn start(&mut self) -> Result<(), EngineFailure>;

    /// Converts `source` into a PDF written under `out_dir` and returns its path.
    async fn convert(&mut self, source: &Path, out_dir: &Path) -> Result<PathBuf, EngineFailure>;

    /// Tears the instance down. Must not fail; leftovers are logged.
    async fn terminate(&mut self);

    /// Cheap liveness probe run after a restart.
    async fn health_check(&mut self) -> Result<(), EngineFailure>;
}

/// Builds the engine instance owned by a slot.
pub trait EngineFactory: Send + Sync + Debug {
    fn create(&self, slot: SlotId) -> Box<dyn ConversionEngine>;
}
