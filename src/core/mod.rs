//! Core copy and merge engine
//!
//! Job records, job discovery, the worker pool and the two facades that
//! tie them together.

pub mod collector;
mod copier;
mod job;
mod merger;
pub mod scheduler;
pub mod transfer;

pub use collector::{AdmissionPolicy, CollectStats, JobCollector, PairKind};
pub use copier::*;
pub use job::*;
pub use merger::*;
pub use scheduler::*;
