//! Configuration types and defaults.

mod defaults;
mod mount_spec;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use mount_spec::*;
