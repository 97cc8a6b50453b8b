//! Error types shared by the transport and the synchronizer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The engine answered with a `?` failure response.
    #[error("engine rejected `{command}`: {message}")]
    Command { command: String, message: String },

    /// The engine process is gone (exited, or its pipes were closed).
    #[error("engine exited while handling `{command}`")]
    EngineExited { command: String },

    #[error("engine did not answer `{command}` within {secs}s")]
    Timeout { command: String, secs: u64 },

    /// An undo was needed but the engine supports neither `undo` nor `gg-undo`.
    #[error("engine does not support undo")]
    UndoNotSupported,

    #[error("malformed GTP response: {0}")]
    Protocol(String),

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// True for failures raised by the peer or the pipe to it, as opposed to
    /// capability or local errors.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::Command { .. }
                | SyncError::EngineExited { .. }
                | SyncError::Timeout { .. }
                | SyncError::Protocol(_)
                | SyncError::Io(_)
        )
    }
}
