use crate::error::FailureReason;
use crate::storage::ArtifactSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(JobId)
    }
}

/// Which rendering path produces the PDF.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Vector drawing straight to PDF.
    #[default]
    Native,
    /// ODT through the conversion engine.
    Office,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Native => write!(f, "native"),
            OutputFormat::Office => write!(f, "office"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(OutputFormat::Native),
            "office" => Ok(OutputFormat::Office),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Rendering,
    Converting,
    Ready,
    Failed,
    Expired,
}

impl JobState {
    /// Ready, Failed and Expired. Ready can still move to Expired.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Ready | JobState::Failed | JobState::Expired)
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, JobState::Queued | JobState::Rendering | JobState::Converting)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Queued, Rendering)
                | (Queued, Failed)
                | (Rendering, Converting)
                | (Rendering, Ready)
                | (Rendering, Failed)
                | (Converting, Ready)
                | (Converting, Failed)
                | (Ready, Expired)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Queued => "queued",
            JobState::Rendering => "rendering",
            JobState::Converting => "converting",
            JobState::Ready => "ready",
            JobState::Failed => "failed",
            JobState::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// A job record, owned by the job table.
#[derive(Debug, Clone)]
pub struct ReportJob {
    pub id: JobId,
    pub template_id: String,
    pub data: Arc<Value>,
    pub format: OutputFormat,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub deadline: Instant,
    pub artifact: Option<ArtifactSummary>,
    pub failure: Option<FailureReason>,
}

impl ReportJob {
    pub fn new(template_id: String, data: Arc<Value>, format: OutputFormat, deadline: Instant) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            template_id,
            data,
            format,
            state: JobState::Queued,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            deadline,
            artifact: None,
            failure: None,
        }
    }
}

/// Snapshot returned by `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub template_id: String,
    pub format: OutputFormat,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl From<&ReportJob> for JobStatus {
    fn from(job: &ReportJob) -> Self {
        Self {
            job_id: job.id,
            template_id: job.template_id.clone(),
            format: job.format,
            state: job.state,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            artifact: job.artifact.clone(),
            failure: job.failure.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions_are_monotonic() {
        use JobState::*;
        assert!(Queued.can_transition_to(Rendering));
        assert!(Rendering.can_transition_to(Converting));
        assert!(Converting.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Expired));
        assert!(Queued.can_transition_to(Failed));

        assert!(!Ready.can_transition_to(Rendering));
        assert!(!Failed.can_transition_to(Ready));
        assert!(!Expired.can_transition_to(Ready));
        assert!(!Queued.can_transition_to(Ready));
        assert!(!Converting.can_transition_to(Converting));
        assert!(!Failed.can_transition_to(Expired));
    }

    #[test]
    fn ids_and_formats_parse_back() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert_eq!("office".parse::<OutputFormat>(), Ok(OutputFormat::Office));
        assert!("docx".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn status_serializes_without_empty_fields() {
        let job = ReportJob::new("quote".into(), Arc::new(Value::Null), OutputFormat::Native, Instant::now());
        let json = serde_json::to_value(JobStatus::from(&job)).unwrap();
        assert_eq!(json["state"], "queued");
        assert_eq!(json["format"], "native");
        assert!(json.get("failure").is_none());
        assert!(json.get("started_at").is_none());
    }
}
