pub mod config;
pub mod error;
pub mod graph;
pub mod msg;
pub mod nodes;
mod test;
pub mod utils;

pub mod prelude;

pub use utils::logger::Throttle;
