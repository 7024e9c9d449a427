pub mod artifact;

pub use artifact::{Artifact, ArtifactStore, ArtifactSummary, Lookup, RetentionPolicy, StoreError, download_name};
