//! `vmshare` shares host directories into a local VM over 9P.

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod management;
pub mod server;
pub mod vm;

pub use error::*;
