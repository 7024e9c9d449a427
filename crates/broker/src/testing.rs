//! A process-free engine for exercising the broker.
//!
//! Conversions follow a shared script of [`Step`]s consumed in call order
//! across all slots; once the script runs out every call succeeds. The
//! [`EngineProbe`] records what the engines saw, including the highest number
//! of overlapping calls per slot.

use crate::engine::{ConversionEngine, EngineFactory, SlotId};
use crate::error::EngineFailure;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bytes written by a successful scripted conversion.
pub const SCRIPTED_PDF: &[u8] = b"%PDF-1.7\n% scripted conversion\n%%EOF";

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Succeed,
    /// Non-zero exit.
    Crash,
    /// Never answers.
    Hang,
    /// Clean exit without output.
    Reject,
    /// Succeeds after the given time.
    Delay(Duration),
}

#[derive(Debug, Default)]
pub struct EngineProbe {
    pub calls: AtomicUsize,
    pub starts: AtomicUsize,
    pub terminations: AtomicUsize,
    running: AtomicUsize,
    in_flight: Mutex<BTreeMap<SlotId, usize>>,
    max_in_flight: Mutex<BTreeMap<SlotId, usize>>,
    global_in_flight: AtomicUsize,
    pub max_global_in_flight: AtomicUsize,
}

impl EngineProbe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Engines currently started and not yet terminated or crashed.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping conversions observed on any single slot.
    pub fn max_per_slot(&self) -> usize {
        let max = self.max_in_flight.lock().unwrap_or_else(|e| e.into_inner());
        max.values().copied().max().unwrap_or(0)
    }

    /// Slots that served at least one conversion.
    pub fn slots_used(&self) -> usize {
        self.max_in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn enter(&self, slot: SlotId) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let global = self.global_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_global_in_flight.fetch_max(global, Ordering::SeqCst);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let current = in_flight.entry(slot).or_default();
        *current += 1;
        let mut max = self.max_in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let seen = max.entry(slot).or_default();
        *seen = (*seen).max(*current);
    }

    fn leave(&self, slot: SlotId) {
        self.global_in_flight.fetch_sub(1, Ordering::SeqCst);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = in_flight.get_mut(&slot) {
            *current = current.saturating_sub(1);
        }
    }
}

/// Decrements the in-flight counters even when the conversion future is
/// dropped by a timeout.
struct InFlight<'a> {
    probe: &'a EngineProbe,
    slot: SlotId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.probe.leave(self.slot);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    script: Arc<Mutex<VecDeque<Step>>>,
    failing_starts: Arc<AtomicU32>,
    start_delay: Arc<Mutex<Duration>>,
    probe: Arc<EngineProbe>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps<I: IntoIterator<Item = Step>>(self, steps: I) -> Self {
        self.push_steps(steps);
        self
    }

    pub fn push_steps<I: IntoIterator<Item = Step>>(&self, steps: I) {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).extend(steps);
    }

    /// The next `count` engine starts fail, across all slots.
    pub fn fail_next_starts(&self, count: u32) {
        self.failing_starts.store(count, Ordering::SeqCst);
    }

    /// Every later engine start takes `delay` before it completes.
    pub fn delay_starts(&self, delay: Duration) {
        *self.start_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn probe(&self) -> Arc<EngineProbe> {
        Arc::clone(&self.probe)
    }

    fn next_step(&self) -> Step {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front().unwrap_or(Step::Succeed)
    }
}

impl EngineFactory for ScriptedFactory {
    fn create(&self, slot: SlotId) -> Box<dyn ConversionEngine> {
        Box::new(ScriptedEngine { slot, factory: self.clone(), running: false })
    }
}

#[derive(Debug)]
pub struct ScriptedEngine {
    slot: SlotId,
    factory: ScriptedFactory,
    running: bool,
}

impl ScriptedEngine {
    fn set_running(&mut self, running: bool) {
        if self.running != running {
            let live = &self.factory.probe.running;
            if running {
                live.fetch_add(1, Ordering::SeqCst);
            } else {
                live.fetch_sub(1, Ordering::SeqCst);
            }
            self.running = running;
        }
    }
}

#[async_trait]
impl ConversionEngine for ScriptedEngine {
    async fn start(&mut self) -> Result<(), EngineFailure> {
        self.factory.probe.starts.fetch_add(1, Ordering::SeqCst);
        let failing = &self.factory.failing_starts;
        if failing.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(EngineFailure::Crashed { code: Some(81), stderr: "scripted start failure".to_string() });
        }
        let delay = *self.factory.start_delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.set_running(true);
        Ok(())
    }

    async fn convert(&mut self, source: &Path, out_dir: &Path) -> Result<PathBuf, EngineFailure> {
        if !self.running {
            return Err(EngineFailure::Io("engine not running".to_string()));
        }
        let probe = Arc::clone(&self.factory.probe);
        probe.enter(self.slot);
        let _guard = InFlight { probe: &probe, slot: self.slot };

        match self.factory.next_step() {
            Step::Succeed => {}
            Step::Delay(duration) => tokio::time::sleep(duration).await,
            Step::Crash => {
                self.set_running(false);
                return Err(EngineFailure::Crashed { code: Some(1), stderr: "scripted crash".to_string() });
            }
            Step::Hang => std::future::pending::<()>().await,
            Step::Reject => return Err(EngineFailure::MissingOutput),
        }

        let stem = source.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let produced = out_dir.join(format!("{}.pdf", stem));
        std::fs::write(&produced, SCRIPTED_PDF)?;
        Ok(produced)
    }

    async fn terminate(&mut self) {
        self.factory.probe.terminations.fetch_add(1, Ordering::SeqCst);
        self.set_running(false);
    }

    async fn health_check(&mut self) -> Result<(), EngineFailure> {
        if self.running {
            Ok(())
        } else {
            Err(EngineFailure::Io("engine not running".to_string()))
        }
    }
}
