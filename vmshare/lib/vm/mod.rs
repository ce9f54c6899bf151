//! Machine profiles and the guest management channel.

mod guest;
mod machine;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use guest::*;
pub use machine::*;
