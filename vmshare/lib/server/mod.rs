//! The 9P share server and its host filesystem backend.

mod hostfs;
mod share;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use hostfs::*;
pub use share::*;
