//! LibreOffice in headless mode.
//!
//! Every conversion runs `soffice --headless --convert-to pdf` against a user
//! profile private to the slot, so concurrent slots never contend for the
//! profile lock. A restart discards the profile and starts from a fresh one.

use crate::engine::{ConversionEngine, EngineFactory, SlotId};
use crate::error::EngineFailure;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct SofficeFactory {
    program: PathBuf,
    profile_root: Option<PathBuf>,
}

impl SofficeFactory {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self { program: program.into(), profile_root: None }
    }

    /// Directory under which per-slot profiles are created; the system temp
    /// directory when unset.
    pub fn with_profile_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.profile_root = Some(root.into());
        self
    }
}

impl EngineFactory for SofficeFactory {
    fn create(&self, slot: SlotId) -> Box<dyn ConversionEngine> {
        Box::new(SofficeEngine {
            slot,
            program: self.program.clone(),
            profile_root: self.profile_root.clone(),
            profile: None,
        })
    }
}

#[derive(Debug)]
pub struct SofficeEngine {
    slot: SlotId,
    program: PathBuf,
    profile_root: Option<PathBuf>,
    profile: Option<TempDir>,
}

impl SofficeEngine {
    fn command(&self) -> Result<Command, EngineFailure> {
        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| EngineFailure::Io("engine used before start".to_string()))?;
        let mut command = Command::new(&self.program);
        command
            .arg(format!("-env:UserInstallation=file://{}", profile.path().display()))
            .arg("--headless")
            .arg("--norestore")
            .arg("--nologo")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }
}

fn crashed(output: &std::process::Output) -> EngineFailure {
    EngineFailure::Crashed {
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

#[async_trait]
impl ConversionEngine for SofficeEngine {
    async fn start(&mut self) -> Result<(), EngineFailure> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("quire-soffice-{}-", self.slot);
        builder.prefix(&prefix);
        let profile = match &self.profile_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        debug!("[SLOT-{}] Using profile {}", self.slot, profile.path().display());
        self.profile = Some(profile);
        Ok(())
    }

    async fn convert(&mut self, source: &Path, out_dir: &Path) -> Result<PathBuf, EngineFailure> {
        let output = self
            .command()?
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(out_dir)
            .arg(source)
            .output()
            .await?;
        if !output.status.success() {
            return Err(crashed(&output));
        }

        let stem = source
            .file_stem()
            .ok_or_else(|| EngineFailure::Io(format!("source has no file name: {}", source.display())))?;
        let produced = out_dir.join(format!("{}.pdf", stem.to_string_lossy()));
        if tokio::fs::try_exists(&produced).await? {
            Ok(produced)
        } else {
            debug!(
                "[SLOT-{}] soffice exited cleanly without output: {}",
                self.slot,
                String::from_utf8_lossy(&output.stdout).trim()
            );
            Err(EngineFailure::MissingOutput)
        }
    }

    async fn terminate(&mut self) {
        if let Some(profile) = self.profile.take() {
            let path = profile.path().to_path_buf();
            if let Err(e) = profile.close() {
                warn!("[SLOT-{}] Failed to remove profile {}: {}", self.slot, path.display(), e);
            }
        }
    }

    async fn health_check(&mut self) -> Result<(), EngineFailure> {
        let output = self.command()?.arg("--version").output().await?;
        if output.status.success() {
            info!(
                "[SLOT-{}] Engine healthy: {}",
                self.slot,
                String::from_utf8_lossy(&output.stdout).trim()
            );
            Ok(())
        } else {
            Err(crashed(&output))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_an_io_failure() {
        let factory = SofficeFactory::new("/nonexistent/quire-soffice");
        let mut engine = factory.create(0);
        engine.start().await.unwrap();
        let out = tempfile::tempdir().unwrap();
        let err = engine.convert(Path::new("/tmp/report.odt"), out.path()).await.unwrap_err();
        assert!(matches!(err, EngineFailure::Io(_)));
        assert!(err.needs_restart());
        engine.terminate().await;
    }

    #[tokio::test]
    async fn profile_is_private_and_removed_on_terminate() {
        let root = tempfile::tempdir().unwrap();
        let factory = SofficeFactory::new("soffice").with_profile_root(root.path());
        let mut engine = SofficeEngine {
            slot: 3,
            program: factory.program.clone(),
            profile_root: factory.profile_root.clone(),
            profile: None,
        };
        engine.start().await.unwrap();
        let profile = engine.profile.as_ref().unwrap().path().to_path_buf();
        assert!(profile.starts_with(root.path()));
        assert!(profile.file_name().unwrap().to_string_lossy().starts_with("quire-soffice-3-"));
        engine.terminate().await;
        assert!(!profile.exists());
    }

    #[tokio::test]
    async fn using_an_unstarted_engine_fails_cleanly() {
        let mut engine = SofficeFactory::new("soffice").create(1);
        let err = engine.health_check().await.unwrap_err();
        assert!(matches!(err, EngineFailure::Io(ref m) if m.contains("before start")));
    }
}
