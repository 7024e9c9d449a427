use std::time::Duration;
use thiserror::Error;

/// How a single engine invocation went wrong.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineFailure {
    #[error("Engine exited with status {code:?}: {stderr}")]
    Crashed { code: Option<i32>, stderr: String },

    #[error("Engine did not answer within {0:?}")]
    Unresponsive(Duration),

    #[error("Engine I/O failure: {0}")]
    Io(String),

    #[error("Engine exited normally but produced no output")]
    MissingOutput,
}

impl EngineFailure {
    /// Whether the engine instance must be torn down before it is reused.
    ///
    /// Only a clean run without output leaves the engine in a known state.
    pub fn needs_restart(&self) -> bool {
        !matches!(self, EngineFailure::MissingOutput)
    }
}

impl From<std::io::Error> for EngineFailure {
    fn from(err: std::io::Error) -> Self {
        EngineFailure::Io(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConversionError {
    /// No slot became free before the deadline. No attempt was made.
    #[error("No conversion slot became available within {waited:?}")]
    Timeout { waited: Duration },

    #[error("Conversion failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: EngineFailure },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Conversion broker is shut down")]
    Shutdown,
}
