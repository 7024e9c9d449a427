use crate::engine::{EngineFactory, SlotId};
use crate::error::{ConversionError, EngineFailure};
use crate::slot::{ConversionSlot, SlotState, TaskId};
use crate::task::ConversionTask;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tempfile::{TempDir, TempPath};
use tokio::time::{Instant, sleep, timeout, timeout_at};

/// Attempts and backoff between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_backoff: Duration::from_secs(1), max_backoff: Duration::from_secs(8) }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (1-based): base, doubling, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_backoff.saturating_mul(1u32 << exponent).min(self.max_backoff)
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub slots: usize,
    /// Upper bound for one engine invocation.
    pub attempt_timeout: Duration,
    /// Upper bound for terminate + start + health check.
    pub restart_timeout: Duration,
    pub retry: RetryPolicy,
    /// Where converted output directories are created; the system temp
    /// directory when unset.
    pub work_dir: Option<PathBuf>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            slots: 1,
            attempt_timeout: Duration::from_secs(60),
            restart_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            work_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub conversions: u64,
    pub failed_attempts: u64,
    pub exhausted: u64,
    pub restarts: u64,
    pub queue_timeouts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    conversions: AtomicU64,
    failed_attempts: AtomicU64,
    exhausted: AtomicU64,
    restarts: AtomicU64,
    queue_timeouts: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// A converted PDF inside a private directory; both vanish when dropped.
#[derive(Debug)]
pub struct ConvertedPdf {
    dir: TempDir,
    path: PathBuf,
}

impl ConvertedPdf {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

#[derive(Debug)]
struct BrokerInner {
    config: BrokerConfig,
    slots: Vec<Arc<ConversionSlot>>,
    idle_tx: async_channel::Sender<SlotId>,
    idle_rx: async_channel::Receiver<SlotId>,
    next_task: AtomicU64,
    counters: Counters,
    shut_down: AtomicBool,
}

/// Arbitrates a fixed pool of conversion engines.
///
/// Idle slot ids circulate through a bounded channel sized to the pool, so
/// callers are served first-available and never see a slot that is busy or
/// restarting. A slot whose engine crashed or hung is handed to a recovery
/// task and rejoins the channel only after a successful health check.
#[derive(Debug, Clone)]
pub struct ConversionBroker {
    inner: Arc<BrokerInner>,
}

impl ConversionBroker {
    /// Creates and starts one engine per slot. Slots whose engine fails to
    /// start are left to background recovery instead of failing startup.
    pub async fn start(config: BrokerConfig, factory: Arc<dyn EngineFactory>) -> Self {
        let count = if config.slots == 0 {
            warn!("[BROKER] Slot pool size 0 requested; using 1.");
            1
        } else {
            config.slots
        };
        let (idle_tx, idle_rx) = async_channel::bounded(count);

        let mut slots = Vec::with_capacity(count);
        let mut failed = Vec::new();
        for id in 0..count {
            let mut engine = factory.create(id);
            let state = match engine.start().await {
                Ok(()) => SlotState::Idle,
                Err(e) => {
                    error!("[SLOT-{}] Engine failed to start: {}", id, e);
                    failed.push(id);
                    SlotState::Restarting
                }
            };
            slots.push(Arc::new(ConversionSlot::new(id, engine, state)));
            if state == SlotState::Idle {
                let _ = idle_tx.try_send(id);
            }
        }

        info!(
            "[BROKER] Started with {} slot(s), {} attempt(s) per task, {:?} per attempt.",
            count, config.retry.max_attempts, config.attempt_timeout
        );
        let inner = Arc::new(BrokerInner {
            config,
            slots,
            idle_tx,
            idle_rx,
            next_task: AtomicU64::new(1),
            counters: Counters::default(),
            shut_down: AtomicBool::new(false),
        });
        for id in failed {
            let slot = Arc::clone(&inner.slots[id]);
            tokio::spawn(Arc::clone(&inner).recover(slot, 1));
        }
        Self { inner }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Converts `source` to PDF, retrying crashed, hung or rejected attempts
    /// until the retry budget or `deadline` runs out.
    ///
    /// The intermediate file is deleted when this returns, whatever the
    /// outcome.
    pub async fn convert(&self, source: TempPath, deadline: Instant) -> Result<ConvertedPdf, ConversionError> {
        let inner = &self.inner;
        if inner.shut_down.load(Ordering::SeqCst) {
            return Err(ConversionError::Shutdown);
        }
        let mut task = ConversionTask::new(TaskId(inner.next_task.fetch_add(1, Ordering::Relaxed)), source, deadline);
        let policy = inner.config.retry;
        let queued_at = Instant::now();
        let out_dir = inner.output_dir()?;
        let mut last_failure: Option<EngineFailure> = None;

        loop {
            let lease = match timeout_at(task.deadline, inner.acquire(&task)).await {
                Ok(Ok(lease)) => lease,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(match last_failure {
                        Some(last) => inner.exhausted(task.id, task.attempts, last),
                        None => {
                            bump(&inner.counters.queue_timeouts);
                            let waited = queued_at.elapsed();
                            warn!("[BROKER] {} timed out after {:?} waiting for a slot.", task.id, waited);
                            ConversionError::Timeout { waited }
                        }
                    });
                }
            };

            task.begin_attempt(lease.slot.id);
            let budget = inner.config.attempt_timeout.min(task.deadline.saturating_duration_since(Instant::now()));
            debug!(
                "[SLOT-{}] {} attempt {}/{} ({}) with {:?} budget.",
                lease.slot.id, task.id, task.attempts, policy.max_attempts, task.target, budget
            );

            let outcome = lease.run(task.source(), out_dir.path(), budget).await;
            let slot_id = lease.slot.id;
            let failure = match outcome {
                Ok(path) => {
                    bump(&inner.counters.conversions);
                    info!("[SLOT-{}] {} converted on attempt {}.", slot_id, task.id, task.attempts);
                    return Ok(ConvertedPdf { dir: out_dir, path });
                }
                Err(failure) => failure,
            };

            bump(&inner.counters.failed_attempts);
            warn!(
                "[SLOT-{}] {} attempt {}/{} failed: {}",
                slot_id, task.id, task.attempts, policy.max_attempts, failure
            );
            if failure.needs_restart() {
                lease.restart();
            } else {
                drop(lease);
            }
            task.end_attempt();

            let delay = policy.backoff(task.attempts);
            if task.attempts >= policy.max_attempts || Instant::now() + delay >= task.deadline {
                return Err(inner.exhausted(task.id, task.attempts, failure));
            }
            last_failure = Some(failure);
            sleep(delay).await;
        }
    }

    pub fn stats(&self) -> BrokerStats {
        let c = &self.inner.counters;
        BrokerStats {
            conversions: c.conversions.load(Ordering::Relaxed),
            failed_attempts: c.failed_attempts.load(Ordering::Relaxed),
            exhausted: c.exhausted.load(Ordering::Relaxed),
            restarts: c.restarts.load(Ordering::Relaxed),
            queue_timeouts: c.queue_timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn slot_states(&self) -> Vec<(SlotId, SlotState)> {
        self.inner.slots.iter().map(|slot| (slot.id, slot.state())).collect()
    }

    /// Stops handing out slots and terminates every engine. Waiting callers
    /// fail with [`ConversionError::Shutdown`]; an in-flight conversion is
    /// allowed to finish first.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("[BROKER] Shutting down.");
        self.inner.idle_rx.close();
        for slot in &self.inner.slots {
            slot.engine.lock().await.terminate().await;
            debug!("[SLOT-{}] Engine terminated.", slot.id);
        }
    }
}

impl BrokerInner {
    fn output_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("quire-pdf-");
        match &self.config.work_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }

    async fn acquire(self: &Arc<Self>, task: &ConversionTask) -> Result<SlotLease, ConversionError> {
        loop {
            let id = self.idle_rx.recv().await.map_err(|_| ConversionError::Shutdown)?;
            let Some(slot) = self.slots.get(id) else {
                error!("[BROKER] Unknown slot id {} in idle pool.", id);
                continue;
            };
            match slot.bind(task.next_assignment()) {
                Ok(()) => return Ok(SlotLease { slot: Arc::clone(slot), broker: Arc::clone(self), armed: true }),
                Err(found) => error!("[SLOT-{}] Found {:?} in idle pool; skipping.", id, found),
            }
        }
    }

    fn exhausted(&self, task: TaskId, attempts: u32, last: EngineFailure) -> ConversionError {
        bump(&self.counters.exhausted);
        error!("[BROKER] {} gave up after {} attempt(s): {}", task, attempts, last);
        ConversionError::Exhausted { attempts, last }
    }

    fn release(&self, slot: &ConversionSlot) {
        if slot.expect_transition(SlotState::Idle) && self.idle_tx.try_send(slot.id).is_err() {
            debug!("[SLOT-{}] Idle pool closed; slot parked.", slot.id);
        }
    }

    async fn restart_engine(&self, slot: &ConversionSlot) -> Result<(), EngineFailure> {
        let mut engine = slot.engine.lock().await;
        engine.terminate().await;
        let limit = self.config.restart_timeout;
        timeout(limit, async {
            engine.start().await?;
            engine.health_check().await
        })
        .await
        .map_err(|_| EngineFailure::Unresponsive(limit))?
    }

    /// Restarts `slot` until its engine is healthy, backing off between tries.
    /// `try_number` is the 1-based number of the first try.
    async fn recover(self: Arc<Self>, slot: Arc<ConversionSlot>, mut try_number: u32) {
        loop {
            if self.shut_down.load(Ordering::SeqCst) {
                debug!("[SLOT-{}] Recovery abandoned at shutdown.", slot.id);
                return;
            }
            bump(&self.counters.restarts);
            match self.restart_engine(&slot).await {
                Ok(()) if self.shut_down.load(Ordering::SeqCst) => {
                    // Shutdown may already have terminated this slot.
                    slot.engine.lock().await.terminate().await;
                    debug!("[SLOT-{}] Engine restarted during shutdown; terminated again.", slot.id);
                    return;
                }
                Ok(()) => {
                    info!("[SLOT-{}] Engine restarted.", slot.id);
                    self.release(&slot);
                    return;
                }
                Err(e) => {
                    let delay = self.config.retry.backoff(try_number);
                    warn!("[SLOT-{}] Restart {} failed: {}; retrying in {:?}.", slot.id, try_number, e, delay);
                    try_number += 1;
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Exclusive use of a bound slot. Dropping the lease returns the slot to the
/// idle pool; [`restart`](SlotLease::restart) hands it to recovery instead.
struct SlotLease {
    slot: Arc<ConversionSlot>,
    broker: Arc<BrokerInner>,
    armed: bool,
}

impl SlotLease {
    async fn run(&self, source: &Path, out_dir: &Path, budget: Duration) -> Result<PathBuf, EngineFailure> {
        let mut engine = self.slot.engine.lock().await;
        match timeout(budget, engine.convert(source, out_dir)).await {
            Ok(result) => result,
            Err(_) => Err(EngineFailure::Unresponsive(budget)),
        }
    }

    fn restart(mut self) {
        self.armed = false;
        if self.slot.expect_transition(SlotState::Restarting) {
            warn!("[SLOT-{}] Restarting engine.", self.slot.id);
            tokio::spawn(Arc::clone(&self.broker).recover(Arc::clone(&self.slot), 1));
        }
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        if self.armed {
            self.broker.release(&self.slot);
        }
    }
}
