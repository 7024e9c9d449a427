//! One conversion request as the broker tracks it across attempts.

use crate::engine::SlotId;
use crate::slot::TaskId;
use std::fmt;
use std::path::Path;
use tempfile::TempPath;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TargetFormat {
    #[default]
    Pdf,
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetFormat::Pdf => write!(f, "pdf"),
        }
    }
}

/// What a busy slot is working on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Assignment {
    pub task: TaskId,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Owns the intermediate file, so dropping the task deletes it.
#[derive(Debug)]
pub struct ConversionTask {
    pub id: TaskId,
    source: TempPath,
    pub target: TargetFormat,
    pub deadline: Instant,
    /// Attempts started so far.
    pub attempts: u32,
    /// Slot holding the current attempt, if any.
    pub slot: Option<SlotId>,
}

impl ConversionTask {
    pub fn new(id: TaskId, source: TempPath, deadline: Instant) -> Self {
        Self { id, source, target: TargetFormat::Pdf, deadline, attempts: 0, slot: None }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The assignment the next attempt would bind.
    pub fn next_assignment(&self) -> Assignment {
        Assignment { task: self.id, attempt: self.attempts + 1 }
    }

    pub fn begin_attempt(&mut self, slot: SlotId) {
        self.attempts += 1;
        self.slot = Some(slot);
    }

    pub fn end_attempt(&mut self) {
        self.slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> TempPath {
        tempfile::Builder::new().prefix("quire-").suffix(".odt").tempfile().unwrap().into_temp_path()
    }

    #[test]
    fn attempts_track_the_assigned_slot() {
        let mut task = ConversionTask::new(TaskId(4), source(), Instant::now());
        assert_eq!(task.next_assignment(), Assignment { task: TaskId(4), attempt: 1 });

        task.begin_attempt(1);
        assert_eq!((task.attempts, task.slot), (1, Some(1)));
        assert_eq!(task.next_assignment().attempt, 2);

        task.end_attempt();
        assert_eq!(task.slot, None);
        assert_eq!(task.target, TargetFormat::Pdf);
    }

    #[test]
    fn dropping_the_task_removes_the_intermediate_file() {
        let task = ConversionTask::new(TaskId(1), source(), Instant::now());
        let path = task.source().to_path_buf();
        assert!(path.exists());
        drop(task);
        assert!(!path.exists());
    }
}
