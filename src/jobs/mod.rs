//! Report jobs: submission, the worker pool and the job lifecycle.

mod manager;
pub mod models;
pub mod pipeline;
mod table;
mod worker;

pub use manager::{JobManager, ManagerSettings};
pub use models::{JobId, JobState, JobStatus, OutputFormat, ReportJob};
pub use pipeline::{OfficeDocument, RenderPipeline, RenderedPdf};
