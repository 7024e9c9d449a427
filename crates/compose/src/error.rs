use quire_model::StructureError;
use thiserror::Error;

/// The template/data pairing cannot produce a document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Invalid template '{id}': {message}")]
    Invalid { id: String, message: String },

    #[error("Input data must be a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("Missing required field '{0}'")]
    MissingField(String),

    #[error("Field '{field}' expects {expected}, found {found}")]
    WrongType { field: String, expected: &'static str, found: String },

    #[error("Field '{field}' row {row}: missing required column '{column}'")]
    MissingCell { field: String, row: usize, column: String },

    #[error("Field '{field}' row {row}: column '{column}' expects {expected}, found {found}")]
    WrongCellType {
        field: String,
        row: usize,
        column: String,
        expected: &'static str,
        found: String,
    },

    #[error("Derived field '{field}': {message}")]
    Derived { field: String, message: String },

    #[error("Unknown style '{0}'")]
    UnknownStyle(String),

    #[error("Placeholder rendering failed: {0}")]
    Render(String),
}

impl From<handlebars::RenderError> for TemplateError {
    fn from(err: handlebars::RenderError) -> Self {
        TemplateError::Render(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Composed document is malformed: {0}")]
    Structure(#[from] StructureError),
}
