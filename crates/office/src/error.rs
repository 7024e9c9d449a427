use quire_model::StructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializationError {
    /// The tree holds something the office format cannot carry.
    #[error("Cannot represent {path} in an office document: {reason}")]
    Unsupported { path: String, reason: String },

    #[error("Document tree is malformed: {0}")]
    Structure(#[from] StructureError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SerializationError {
    pub fn unsupported(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unsupported { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, SerializationError>;
