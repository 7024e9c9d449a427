//! quire: templated business reports rendered to PDF.
//!
//! The [`JobManager`] accepts report jobs and runs them on a bounded worker
//! pool. Each job composes a template with its input data into a document
//! tree, then either draws the PDF directly or writes an ODT document and
//! hands it to the [`ConversionBroker`](quire_broker::ConversionBroker), which
//! multiplexes conversions over a small pool of supervised engine processes.
//! Finished PDFs live in the [`ArtifactStore`](storage::ArtifactStore) until
//! they expire.
//!
//! [`ServiceBuilder`] assembles all of it from a [`Config`].

pub mod config;
pub mod error;
pub mod jobs;
pub mod service;
pub mod storage;

pub use crate::config::Config;
pub use error::{FailureKind, FailureReason, JobError, Result, ServiceError};
pub use jobs::{JobId, JobManager, JobState, JobStatus, ManagerSettings, OutputFormat, RenderPipeline};
pub use service::ServiceBuilder;
pub use storage::{Artifact, ArtifactSummary, RetentionPolicy};
