//! Error types, one per stage of a turn.

use std::time::Duration;

use thiserror::Error;

/// The database could not be reached. Fatal to the session.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Please provide all MySQL connection details (missing: {})", missing.join(", "))]
    IncompleteRemote { missing: Vec<&'static str> },

    #[error("failed to open {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: sqlx::Error,
    },
}

/// The LLM could not produce a response.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Transport dropped mid-request. The user may resubmit the same question.
    #[error("connection to the language model was lost: {0}")]
    ConnectionLost(String),

    #[error("language model did not answer within {0:?}")]
    Timeout(Duration),

    #[error("language model error: {0}")]
    Provider(String),

    #[error("Please add the Groq API key")]
    MissingApiKey,
}

impl GenerationError {
    /// Whether resubmitting the same question may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::Timeout(_))
    }
}

/// A SQL statement ran and the driver rejected it.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("{0}")]
    Database(#[from] sqlx::Error),

    #[error("statement did not finish within {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GateError {
    #[error("there is no query awaiting approval")]
    NothingPending,

    #[error("the pending query has already been decided")]
    AlreadyDecided,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Gate(#[from] GateError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
