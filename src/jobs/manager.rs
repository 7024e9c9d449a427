use crate::config::Config;
use crate::error::{FailureKind, FailureReason, JobError};
use crate::jobs::models::{JobId, JobState, JobStatus, OutputFormat, ReportJob};
use crate::jobs::pipeline::RenderPipeline;
use crate::jobs::table::JobTable;
use crate::jobs::worker::{Worker, WorkerContext};
use crate::storage::{Artifact, ArtifactStore, Lookup, RetentionPolicy};
use async_channel::TrySendError;
use chrono::Utc;
use log::{debug, info, warn};
use quire_broker::{BrokerStats, ConversionBroker};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Job manager tunables, decoupled from the config file format.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSettings {
    pub workers: usize,
    pub queue_capacity: usize,
    pub deadline: Duration,
    pub artifact_ttl: Duration,
    pub retention: RetentionPolicy,
    /// How long settled job records stay queryable.
    pub record_retention: Duration,
    pub sweep_interval: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ManagerSettings {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.workers.count,
            queue_capacity: config.workers.queue_capacity,
            deadline: config.job_deadline(),
            artifact_ttl: config.artifact_ttl(),
            retention: config.storage.retention,
            record_retention: config.job_retention(),
            sweep_interval: config.sweep_interval(),
        }
    }
}

struct ManagerInner {
    settings: ManagerSettings,
    table: Arc<JobTable>,
    store: Arc<ArtifactStore>,
    pipeline: Arc<RenderPipeline>,
    broker: ConversionBroker,
    intake: async_channel::Sender<JobId>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    stop_sweeper: watch::Sender<bool>,
    shut_down: AtomicBool,
}

/// Accepts report jobs, runs them on a bounded worker pool and hands out
/// the resulting artifacts.
///
/// Submissions go through a bounded intake queue; when it is full the caller
/// is told so immediately instead of waiting. Cloning is cheap and every
/// clone drives the same workers.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<ManagerInner>,
}

impl JobManager {
    /// Spawns the workers and the sweeper on the current runtime.
    /// Zero worker or queue counts are raised to 1.
    pub fn start(mut settings: ManagerSettings, pipeline: Arc<RenderPipeline>, broker: ConversionBroker) -> Self {
        if settings.workers == 0 || settings.queue_capacity == 0 {
            warn!("Worker count and queue capacity must be at least 1; raising zeros to 1.");
            settings.workers = settings.workers.max(1);
            settings.queue_capacity = settings.queue_capacity.max(1);
        }
        let (intake, queue) = async_channel::bounded(settings.queue_capacity);
        let table = Arc::new(JobTable::default());
        let store = Arc::new(ArtifactStore::new());
        let ctx = Arc::new(WorkerContext {
            table: Arc::clone(&table),
            store: Arc::clone(&store),
            pipeline: Arc::clone(&pipeline),
            broker: broker.clone(),
            artifact_ttl: settings.artifact_ttl,
        });

        let worker_count = settings.workers;
        info!(
            "Starting job manager with {} workers and room for {} queued jobs.",
            worker_count, settings.queue_capacity
        );
        let workers = (0..worker_count)
            .map(|id| tokio::spawn(Worker::new(id, queue.clone(), Arc::clone(&ctx)).run()))
            .collect();
        drop(queue);

        let (stop_sweeper, stop_rx) = watch::channel(false);
        let sweeper = tokio::spawn(sweep_loop(
            Arc::clone(&table),
            Arc::clone(&store),
            settings.sweep_interval,
            settings.record_retention,
            stop_rx,
        ));

        Self {
            inner: Arc::new(ManagerInner {
                settings,
                table,
                store,
                pipeline,
                broker,
                intake,
                workers: Mutex::new(workers),
                sweeper: Mutex::new(Some(sweeper)),
                stop_sweeper,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    pub fn pipeline(&self) -> &Arc<RenderPipeline> {
        &self.inner.pipeline
    }

    /// Queues a job. Fails fast with [`JobError::ResourceExhausted`] when the
    /// intake queue is full; a rejected submission leaves no record behind.
    pub fn submit(&self, template_id: &str, data: Value, format: OutputFormat) -> Result<JobId, JobError> {
        let inner = &self.inner;
        let deadline = Instant::now() + inner.settings.deadline;
        let job = ReportJob::new(template_id.to_string(), Arc::new(data), format, deadline);
        let id = inner.table.insert_with(job, |id| {
            inner.intake.try_send(id).map_err(|e| match e {
                TrySendError::Full(_) => JobError::ResourceExhausted { capacity: inner.settings.queue_capacity },
                TrySendError::Closed(_) => JobError::ShuttingDown,
            })
        });
        match &id {
            Ok(id) => debug!("Queued job {} ({}, {}).", id, template_id, format),
            Err(e) => warn!("Rejected job for '{}': {}", template_id, e),
        }
        id
    }

    pub fn status(&self, id: JobId) -> Result<JobStatus, JobError> {
        self.inner.table.status(id).ok_or(JobError::NotFound(id))
    }

    /// The artifact of a ready job. Every other state is reported as the
    /// matching error.
    pub fn fetch(&self, id: JobId) -> Result<Arc<Artifact>, JobError> {
        let status = self.status(id)?;
        match status.state {
            JobState::Queued | JobState::Rendering | JobState::Converting => {
                Err(JobError::NotReady { id, state: status.state })
            }
            JobState::Failed => Err(JobError::Failed {
                id,
                reason: status
                    .failure
                    .unwrap_or_else(|| FailureReason::new(FailureKind::Internal, "no reason recorded")),
            }),
            JobState::Expired => Err(JobError::Expired(id)),
            JobState::Ready => match self.inner.store.get(id) {
                Lookup::Present(artifact) => Ok(artifact),
                Lookup::Expired | Lookup::Missing => {
                    self.inner.store.remove(id);
                    self.inner.table.expire(&[id]);
                    Err(JobError::Expired(id))
                }
            },
        }
    }

    /// Confirms the caller has the artifact. Under the `acknowledge` policy
    /// the artifact is dropped at once; under `ttl` nothing happens.
    pub fn acknowledge(&self, id: JobId) -> Result<(), JobError> {
        let status = self.status(id)?;
        if status.state.is_in_flight() {
            return Err(JobError::NotReady { id, state: status.state });
        }
        if self.inner.settings.retention == RetentionPolicy::Acknowledge && status.state == JobState::Ready {
            self.inner.store.remove(id);
            self.inner.table.expire(&[id]);
            debug!("Job {} acknowledged; artifact dropped.", id);
        }
        Ok(())
    }

    /// Waits until `id` is no longer queued, rendering or converting.
    pub async fn wait(&self, id: JobId) -> Result<JobStatus, JobError> {
        self.inner.table.wait_settled(id).await.ok_or(JobError::NotFound(id))
    }

    pub fn queue_len(&self) -> usize {
        self.inner.intake.len()
    }

    pub fn job_count(&self) -> usize {
        self.inner.table.len()
    }

    pub fn count_in(&self, state: JobState) -> usize {
        self.inner.table.count_in(state)
    }

    pub fn broker_stats(&self) -> BrokerStats {
        self.inner.broker.stats()
    }

    pub fn broker(&self) -> &ConversionBroker {
        &self.inner.broker
    }

    /// Closes intake, lets the workers finish what was already queued, stops
    /// the sweeper and terminates the conversion engines.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down job manager.");
        inner.intake.close();

        let workers = std::mem::take(&mut *inner.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in workers {
            if let Err(e) = handle.await {
                warn!("Worker ended abnormally: {}", e);
            }
        }

        let _ = inner.stop_sweeper.send(true);
        let sweeper = inner.sweeper.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = sweeper {
            let _ = handle.await;
        }

        inner.broker.shutdown().await;
        info!("Job manager stopped.");
    }
}

/// Expires artifacts past their TTL and evicts settled records past the
/// retention window.
async fn sweep_loop(
    table: Arc<JobTable>,
    store: Arc<ArtifactStore>,
    interval: Duration,
    retention: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        let now = Utc::now();
        let expired = store.sweep(now);
        if !expired.is_empty() {
            info!("Expired {} artifact(s).", expired.len());
            table.expire(&expired);
        }

        let cutoff = chrono::Duration::from_std(retention).ok().and_then(|r| now.checked_sub_signed(r));
        if let Some(cutoff) = cutoff {
            for id in table.evict_settled_before(cutoff) {
                store.forget(id);
                debug!("Evicted job {}.", id);
            }
        }
    }
    debug!("Sweeper stopped.");
}
