//! Generic Access Profile (GAP) types
pub mod types;

pub use types::*;
