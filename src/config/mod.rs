//! Configuration module for FileWork
//!
//! Worker tuning knobs, the large-transfer preset, and CLI arguments.

mod settings;

pub use settings::*;
