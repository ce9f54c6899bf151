//! Error types for the 9P2000 server implementation

use thiserror::Error;

/// Main error type for 9P2000 operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire encoding/decoding error
    #[error("wire error: {0}")]
    Wire(String),

    /// 9P protocol error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Fid management error
    #[error("fid error: {0}")]
    Fid(String),

    /// Filesystem backend error, reported to the client as an Rerror
    #[error("{message}")]
    Fs {
        /// The error string sent in the Rerror ename field
        message: String,

        /// The unix errno sent to 9P2000.u clients
        errno: u32,
    },
}

impl Error {
    /// Creates a filesystem error with an explicit errno.
    pub fn fs(message: impl Into<String>, errno: u32) -> Self {
        Error::Fs {
            message: message.into(),
            errno,
        }
    }

    /// Returns the errno to report to a 9P2000.u client.
    pub fn errno(&self) -> u32 {
        match self {
            Error::Io(e) => e.raw_os_error().unwrap_or(libc::EIO) as u32,
            Error::Fs { errno, .. } => *errno,
            _ => libc::EIO as u32,
        }
    }
}
