//! Error types for strobe-player

use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Player error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Sampler error: {0}")]
    Sampler(String),

    #[error("Pool closed")]
    PoolClosed,

    #[error("Pool item returned to a pool that did not issue it")]
    ForeignPoolItem,

    #[error("Buffer closed")]
    BufferClosed,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unsupported media: {0}")]
    Unsupported(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("{command} failed: {source}")]
    CommandFailed {
        command: &'static str,
        #[source]
        source: Arc<Error>,
    },

    #[error(transparent)]
    Common(#[from] strobe_common::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

impl Error {
    /// Underlying cause, looking through `CommandFailed`
    pub fn root(&self) -> &Error {
        match self {
            Error::CommandFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Log every failure and keep the first one
///
/// Teardown runs every step regardless of earlier failures; this folds the
/// step results into one.
pub(crate) fn first_failure(stage: &'static str, results: Vec<(&'static str, Result<()>)>) -> Result<()> {
    let mut first = None;
    for (resource, result) in results {
        if let Err(e) = result {
            warn!(stage, resource, error = %e, "Failed to release resource");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}
