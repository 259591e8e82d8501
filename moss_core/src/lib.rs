mod counters;
mod error;
mod errors;
mod files;
mod global_state;
mod interface;
mod loc;
mod names;
mod query;
mod symbols;

pub use counters::*;
pub use error::*;
pub use errors::*;
pub use files::*;
pub use global_state::*;
pub use interface::*;
pub use loc::*;
pub use names::*;
pub use query::*;
pub use symbols::*;
