//! 9P2000 Server Implementation
//! This library provides functionality for creating 9P2000 and 9P2000.u file servers.

pub mod error;
pub mod message;
pub mod server;
pub mod state;
pub mod wire;

// Re-export main types
pub use error::Error;
pub use message::{OpenMode, Qid, Stat};
pub use server::{FileSystem, NinepServer, ServerConfig};

/// Result type for 9P operations
pub type Result<T> = std::result::Result<T, Error>;
