//! Progress reporting module
//!
//! Live job and byte counters for copy and merge runs.

mod reporter;

pub use reporter::*;
