use crate::jobs::{JobId, JobState};
use quire_broker::ConversionError;
use quire_compose::{ComposeError, TemplateError};
use quire_office::SerializationError;
use quire_render_lopdf::RenderError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// What a caller of the job manager can be told.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("Intake queue is full ({capacity} jobs waiting); try again later")]
    ResourceExhausted { capacity: usize },

    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Job {id} is not ready (state: {state})")]
    NotReady { id: JobId, state: JobState },

    #[error("Job {id} failed: {reason}")]
    Failed { id: JobId, reason: FailureReason },

    #[error("Artifact of job {0} has expired")]
    Expired(JobId),

    #[error("Job manager is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unknown template, missing or mistyped input data.
    Template,
    /// The composed tree is malformed.
    Structure,
    Render,
    Serialization,
    /// Conversion retries ran out.
    Conversion,
    /// The job deadline passed.
    Timeout,
    Storage,
    /// Panics and shutdown.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Template => "template",
            FailureKind::Structure => "structure",
            FailureKind::Render => "render",
            FailureKind::Serialization => "serialization",
            FailureKind::Conversion => "conversion",
            FailureKind::Timeout => "timeout",
            FailureKind::Storage => "storage",
            FailureKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FailureReason {}

impl From<ComposeError> for FailureReason {
    fn from(err: ComposeError) -> Self {
        match err {
            ComposeError::Template(e) => FailureReason::new(FailureKind::Template, e.to_string()),
            ComposeError::Structure(e) => FailureReason::new(FailureKind::Structure, e.to_string()),
        }
    }
}

impl From<RenderError> for FailureReason {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Structure(e) => FailureReason::new(FailureKind::Structure, e.to_string()),
            other => FailureReason::new(FailureKind::Render, other.to_string()),
        }
    }
}

impl From<SerializationError> for FailureReason {
    fn from(err: SerializationError) -> Self {
        match err {
            SerializationError::Structure(e) => FailureReason::new(FailureKind::Structure, e.to_string()),
            other => FailureReason::new(FailureKind::Serialization, other.to_string()),
        }
    }
}

impl From<ConversionError> for FailureReason {
    fn from(err: ConversionError) -> Self {
        let kind = match err {
            ConversionError::Timeout { .. } => FailureKind::Timeout,
            ConversionError::Exhausted { .. } | ConversionError::Io(_) => FailureKind::Conversion,
            ConversionError::Shutdown => FailureKind::Internal,
        };
        FailureReason::new(kind, err.to_string())
    }
}

/// Startup, configuration and CLI failures.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Composition failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input data: {0}")]
    Data(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use quire_broker::EngineFailure;
    use std::time::Duration;

    #[test]
    fn compose_errors_keep_their_kind() {
        let reason = FailureReason::from(ComposeError::Template(TemplateError::MissingField("project".into())));
        assert_eq!(reason.kind, FailureKind::Template);
        assert!(reason.message.contains("project"));
    }

    #[test]
    fn conversion_errors_map_to_timeout_or_conversion() {
        let waited = FailureReason::from(ConversionError::Timeout { waited: Duration::from_secs(2) });
        assert_eq!(waited.kind, FailureKind::Timeout);

        let exhausted = FailureReason::from(ConversionError::Exhausted {
            attempts: 3,
            last: EngineFailure::Crashed { code: Some(1), stderr: "boom".into() },
        });
        assert_eq!(exhausted.kind, FailureKind::Conversion);
        assert!(exhausted.message.contains("3 attempt"));
        assert_eq!(exhausted.to_string().split(':').next(), Some("conversion"));
    }
}
