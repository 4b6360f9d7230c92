pub mod holdings;
pub mod key;
pub mod meta;
pub mod spike;
pub mod state;

pub use holdings::*;
pub use key::*;
pub use meta::*;
pub use spike::*;
pub use state::*;
