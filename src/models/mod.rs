// Re-export model modules
mod category;
mod option_chain;
mod raw;
mod symbol;

pub use category::*;
pub use option_chain::*;
pub use raw::*;
pub use symbol::*;
