use crate::cursor::CursorError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Transport failure: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed frame: {0}")]
    Frame(#[from] CursorError),
    /// A connect failure the server has no specific reply code for. The client
    /// has already been sent `NetworkUnreachable` when this is returned.
    #[error("Unable to connect to {host}:{port}: {source}")]
    Upstream {
        host: String,
        port: u16,
        source: io::Error,
    },
}

impl SessionError {
    /// Whether an operator should hear about this, as opposed to a client
    /// that simply went away.
    pub fn is_operational(&self) -> bool {
        matches!(self, SessionError::Upstream { .. })
    }
}
