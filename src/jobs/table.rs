use crate::jobs::models::{JobId, JobState, JobStatus, OutputFormat, ReportJob};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Error, Debug, Clone, PartialEq)]
pub(crate) enum TransitionError {
    #[error("job {0} is not in the table")]
    Missing(JobId),
    #[error("job {id} cannot move from {from} to {to}")]
    Illegal { id: JobId, from: JobState, to: JobState },
}

/// What a worker needs to run a job.
#[derive(Debug, Clone)]
pub(crate) struct WorkItem {
    pub template_id: String,
    pub data: Arc<Value>,
    pub format: OutputFormat,
    pub deadline: Instant,
}

/// Every job record, behind one mutex. Each state change is a single
/// locked update validated against the lifecycle.
#[derive(Debug, Default)]
pub(crate) struct JobTable {
    jobs: Mutex<HashMap<JobId, ReportJob>>,
    changed: Notify,
}

impl JobTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, ReportJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts `job` and runs `enqueue` while the table is still locked; the
    /// record is removed again if `enqueue` fails, so nobody ever observes a
    /// job that was not queued.
    pub fn insert_with<E>(&self, job: ReportJob, enqueue: impl FnOnce(JobId) -> Result<(), E>) -> Result<JobId, E> {
        let id = job.id;
        let mut jobs = self.lock();
        jobs.insert(id, job);
        if let Err(e) = enqueue(id) {
            jobs.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.lock().get(&id).map(JobStatus::from)
    }

    pub fn work_item(&self, id: JobId) -> Option<WorkItem> {
        self.lock().get(&id).map(|job| WorkItem {
            template_id: job.template_id.clone(),
            data: Arc::clone(&job.data),
            format: job.format,
            deadline: job.deadline,
        })
    }

    /// Moves `id` to `next`, applying `update` in the same critical section.
    pub fn transition(
        &self,
        id: JobId,
        next: JobState,
        update: impl FnOnce(&mut ReportJob),
    ) -> Result<(), TransitionError> {
        {
            let mut jobs = self.lock();
            let job = jobs.get_mut(&id).ok_or(TransitionError::Missing(id))?;
            if !job.state.can_transition_to(next) {
                return Err(TransitionError::Illegal { id, from: job.state, to: next });
            }
            let now = Utc::now();
            job.state = next;
            job.updated_at = now;
            match next {
                JobState::Rendering => job.started_at = Some(now),
                JobState::Ready | JobState::Failed => job.finished_at = Some(now),
                _ => {}
            }
            update(job);
        }
        debug!("Job {} -> {}", id, next);
        self.changed.notify_waiters();
        Ok(())
    }

    /// Marks ready jobs whose artifact is gone as expired.
    pub fn expire(&self, ids: &[JobId]) {
        for id in ids {
            match self.transition(*id, JobState::Expired, |_| {}) {
                Ok(()) | Err(TransitionError::Missing(_)) => {}
                Err(e) => warn!("Not expiring: {}", e),
            }
        }
    }

    /// Removes terminal records last updated before `cutoff`.
    pub fn evict_settled_before(&self, cutoff: DateTime<Utc>) -> Vec<JobId> {
        let mut jobs = self.lock();
        let due: Vec<JobId> = jobs
            .values()
            .filter(|job| job.state.is_terminal() && job.updated_at < cutoff)
            .map(|job| job.id)
            .collect();
        for id in &due {
            jobs.remove(id);
        }
        due
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn count_in(&self, state: JobState) -> usize {
        self.lock().values().filter(|job| job.state == state).count()
    }

    /// Resolves once `id` leaves the in-flight states; `None` if unknown.
    pub async fn wait_settled(&self, id: JobId) -> Option<JobStatus> {
        loop {
            let mut notified = pin!(self.changed.notified());
            notified.as_mut().enable();
            let status = self.status(id)?;
            if !status.state.is_in_flight() {
                return Some(status);
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job() -> ReportJob {
        ReportJob::new("quote".into(), Arc::new(Value::Null), OutputFormat::Native, Instant::now())
    }

    #[test]
    fn rejected_enqueue_leaves_no_record() {
        let table = JobTable::default();
        let result: Result<JobId, &str> = table.insert_with(job(), |_| Err("full"));
        assert_eq!(result, Err("full"));
        assert_eq!(table.len(), 0);

        let id = table.insert_with(job(), |_| Ok::<(), ()>(())).unwrap();
        assert_eq!(table.status(id).unwrap().state, JobState::Queued);
    }

    #[test]
    fn transitions_are_validated_and_stamped() {
        let table = JobTable::default();
        let id = table.insert_with(job(), |_| Ok::<(), ()>(())).unwrap();

        assert_eq!(
            table.transition(id, JobState::Ready, |_| {}),
            Err(TransitionError::Illegal { id, from: JobState::Queued, to: JobState::Ready })
        );
        table.transition(id, JobState::Rendering, |_| {}).unwrap();
        table.transition(id, JobState::Ready, |_| {}).unwrap();

        let status = table.status(id).unwrap();
        assert!(status.started_at.is_some());
        assert!(status.finished_at.unwrap() >= status.started_at.unwrap());
        let unknown = JobId::new();
        assert_eq!(
            table.transition(unknown, JobState::Rendering, |_| {}),
            Err(TransitionError::Missing(unknown))
        );
    }

    #[test]
    fn settled_records_are_evicted_after_the_cutoff() {
        let table = JobTable::default();
        let done = table.insert_with(job(), |_| Ok::<(), ()>(())).unwrap();
        let queued = table.insert_with(job(), |_| Ok::<(), ()>(())).unwrap();
        table.transition(done, JobState::Failed, |_| {}).unwrap();

        assert!(table.evict_settled_before(Utc::now() - chrono::Duration::seconds(60)).is_empty());
        let evicted = table.evict_settled_before(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(evicted, vec![done]);
        assert!(table.status(queued).is_some());
    }

    #[tokio::test]
    async fn waiters_wake_on_settlement() {
        let table = Arc::new(JobTable::default());
        let id = table.insert_with(job(), |_| Ok::<(), ()>(())).unwrap();

        let waiter = tokio::spawn({
            let table = Arc::clone(&table);
            async move { table.wait_settled(id).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        table.transition(id, JobState::Rendering, |_| {}).unwrap();
        table.transition(id, JobState::Failed, |_| {}).unwrap();

        let status = waiter.await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert!(table.wait_settled(JobId::new()).await.is_none());
    }
}
