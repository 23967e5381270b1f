//! File system collaborator
//!
//! Directory enumeration, timestamp queries, idempotent directory creation
//! and buffered stream handles used by the job collector and the transfer
//! engine.

mod operations;
mod scanner;

pub use operations::*;
pub use scanner::*;
