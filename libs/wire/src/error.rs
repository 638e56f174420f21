//! Error types for the wire codec.

use std::io;

use thiserror::Error;

/// Errors raised while reading or writing Thrift messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// The bytes on the wire are not a valid binary-protocol message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A frame or message exceeds the configured size limit.
    #[error("frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
}

impl WireError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns true if the peer closed the connection mid-message.
    pub fn is_disconnect(&self) -> bool {
        match self {
            WireError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
