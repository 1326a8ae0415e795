use std::path::PathBuf;

use pops_exec::ExecError;
use pops_model::ModelError;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Every slot of the pool is held by a live process.
    #[error("no free slot available on this system")]
    NoSlotAvailable,

    /// The executable could not be started; the slot has been released.
    #[error("failed to start task: {0}")]
    Spawn(#[source] ExecError),

    /// The task ran and reported a non-zero return code.
    #[error("task '{task}' returns '{code}'")]
    TaskReturnedError { task: String, code: i32 },

    /// A value does not have the shape its schema declares.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The task went away without reporting a result.
    #[error("task '{task}' vanished: {reason}")]
    ProcessVanished { task: String, reason: String },

    /// Another caller aborted the task while this one was waiting on it.
    #[error("task '{task}' was aborted")]
    Aborted { task: String },

    #[error("{package} user number is not set")]
    UserNumberNotSet { package: &'static str },

    #[error("unknown task handle: {0}")]
    UnknownHandle(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("schema for '{task}' unavailable: {reason}")]
    Schema { task: String, reason: String },

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("exec error: {0}")]
    Exec(#[from] ExecError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn file(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> CoreError {
        let path = path.into();
        move |source| CoreError::File { path, source }
    }

    /// Whether retrying later may succeed without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::NoSlotAvailable)
    }
}
