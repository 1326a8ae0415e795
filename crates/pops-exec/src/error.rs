use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("missing program: {0}")]
    MissingProgram(PathBuf),
    #[error("spawn failed for {program}: {reason}")]
    Spawn { program: PathBuf, reason: String },
    #[error("failed to allocate pseudo-terminal: {0}")]
    Pty(#[source] Errno),
    #[error("readiness wait failed: {0}")]
    Poll(#[source] Errno),
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: Errno,
    },
    #[error("process is no longer running")]
    NotRunning,
    #[error("process is still running")]
    StillRunning,
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}
