//! Mount orchestration and daemon lifecycle.

pub mod db;
pub mod endpoint;
pub mod find;
mod mount;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use endpoint::{resolve_endpoint, Endpoint};
pub use find::find_available_port;
pub use mount::*;
