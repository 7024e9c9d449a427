use crate::error::{FailureKind, FailureReason};
use crate::jobs::models::{JobId, JobState, OutputFormat};
use crate::jobs::pipeline::RenderPipeline;
use crate::jobs::table::{JobTable, WorkItem};
use crate::storage::{Artifact, ArtifactStore, ArtifactSummary};
use log::{error, info, warn};
use quire_broker::ConversionBroker;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::{Instant, timeout_at};

/// Shared by every worker of a manager.
pub(crate) struct WorkerContext {
    pub table: Arc<JobTable>,
    pub store: Arc<ArtifactStore>,
    pub pipeline: Arc<RenderPipeline>,
    pub broker: ConversionBroker,
    pub artifact_ttl: Duration,
}

/// Pulls job ids off the intake queue until it is closed and drained.
pub(crate) struct Worker {
    id: usize,
    queue: async_channel::Receiver<JobId>,
    ctx: Arc<WorkerContext>,
}

impl Worker {
    pub fn new(id: usize, queue: async_channel::Receiver<JobId>, ctx: Arc<WorkerContext>) -> Self {
        Self { id, queue, ctx }
    }

    pub async fn run(self) {
        info!("[WORKER-{}] Started.", self.id);
        while let Ok(job_id) = self.queue.recv().await {
            self.process(job_id).await;
        }
        info!("[WORKER-{}] Shutting down.", self.id);
    }

    async fn process(&self, job_id: JobId) {
        let Some(item) = self.ctx.table.work_item(job_id) else {
            warn!("[WORKER-{}] Job {} vanished before it was picked up.", self.id, job_id);
            return;
        };
        if Instant::now() >= item.deadline {
            warn!("[WORKER-{}] Job {} missed its deadline while queued.", self.id, job_id);
            self.fail(job_id, FailureReason::new(FailureKind::Timeout, "deadline passed while queued"));
            return;
        }
        if let Err(e) = self.ctx.table.transition(job_id, JobState::Rendering, |_| {}) {
            warn!("[WORKER-{}] Skipping job: {}", self.id, e);
            return;
        }
        info!(
            "[WORKER-{}] Processing job {} (template: {}, format: {}).",
            self.id, job_id, item.template_id, item.format
        );

        let rendered = match item.format {
            OutputFormat::Native => self.render_native(&item).await,
            OutputFormat::Office => self.render_office(job_id, &item).await,
        };
        let stored = rendered.and_then(|(bytes, title)| self.store(job_id, bytes, &title));

        match stored {
            Ok(summary) => {
                let size = summary.size;
                match self.ctx.table.transition(job_id, JobState::Ready, |job| job.artifact = Some(summary)) {
                    Ok(()) => info!("[WORKER-{}] Completed job {} ({} bytes).", self.id, job_id, size),
                    Err(e) => {
                        error!("[WORKER-{}] Could not mark job ready: {}", self.id, e);
                        self.ctx.store.remove(job_id);
                    }
                }
            }
            Err(reason) => {
                warn!("[WORKER-{}] Job {} failed: {}", self.id, job_id, reason);
                self.fail(job_id, reason);
            }
        }
    }

    async fn render_native(&self, item: &WorkItem) -> Result<(Vec<u8>, String), FailureReason> {
        let template = item.template_id.clone();
        let data = Arc::clone(&item.data);
        let pdf = self.blocking(item.deadline, move |p| p.render_native(&template, &data)).await?;
        Ok((pdf.bytes, pdf.title))
    }

    async fn render_office(&self, job_id: JobId, item: &WorkItem) -> Result<(Vec<u8>, String), FailureReason> {
        let template = item.template_id.clone();
        let data = Arc::clone(&item.data);
        let document = self.blocking(item.deadline, move |p| p.serialize_office(&template, &data)).await?;

        self.ctx
            .table
            .transition(job_id, JobState::Converting, |_| {})
            .map_err(|e| FailureReason::new(FailureKind::Internal, e.to_string()))?;
        let pdf = self.ctx.broker.convert(document.file, item.deadline).await?;
        let bytes = pdf.read().await.map_err(|e| {
            FailureReason::new(FailureKind::Conversion, format!("converted PDF is unreadable: {}", e))
        })?;
        Ok((bytes, document.title))
    }

    /// Runs `work` on the blocking pool, bounded by the job deadline. A panic
    /// inside `work` becomes an internal failure of this job only.
    async fn blocking<T, F>(&self, deadline: Instant, work: F) -> Result<T, FailureReason>
    where
        F: FnOnce(&RenderPipeline) -> Result<T, FailureReason> + Send + 'static,
        T: Send + 'static,
    {
        let pipeline = Arc::clone(&self.ctx.pipeline);
        let handle = tokio::task::spawn_blocking(move || work(&pipeline));
        match timeout_at(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(self.join_failure(join_error)),
            Err(_) => Err(FailureReason::new(FailureKind::Timeout, "deadline passed while rendering")),
        }
    }

    fn join_failure(&self, err: JoinError) -> FailureReason {
        if err.is_panic() {
            let message = panic_message(err.into_panic());
            error!("[WORKER-{}] Rendering task panicked: {}", self.id, message);
            FailureReason::new(FailureKind::Internal, format!("rendering task panicked: {}", message))
        } else {
            FailureReason::new(FailureKind::Internal, format!("rendering task was cancelled: {}", err))
        }
    }

    fn store(&self, job_id: JobId, bytes: Vec<u8>, title: &str) -> Result<ArtifactSummary, FailureReason> {
        let artifact = Artifact::new(bytes, title, self.ctx.artifact_ttl);
        self.ctx
            .store
            .insert(job_id, artifact)
            .map(|stored| stored.summary())
            .map_err(|e| FailureReason::new(FailureKind::Storage, e.to_string()))
    }

    fn fail(&self, job_id: JobId, reason: FailureReason) {
        if let Err(e) = self.ctx.table.transition(job_id, JobState::Failed, |job| job.failure = Some(reason)) {
            error!("[WORKER-{}] Could not mark job failed: {}", self.id, e);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
