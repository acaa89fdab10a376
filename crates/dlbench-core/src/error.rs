use std::io;

use thiserror::Error;

/// Failures produced while locating or reading a file.
///
/// `NotFound` and `Io` are always kept apart: a missing file is a client
/// problem, anything else on the read path is a server problem.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The destination stopped accepting bytes (client gone or stalled).
    #[error("sink closed: {0}")]
    SinkClosed(#[source] io::Error),

    /// The job never reported back: its worker panicked or the pool is shut down.
    #[error("worker lost before completing the job")]
    WorkerLost,
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Classify an I/O error raised while touching `name`.
    pub fn io(name: impl Into<String>, source: io::Error) -> Self {
        let name = name.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(name)
        } else {
            Self::Io { name, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
