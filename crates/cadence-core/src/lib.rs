//! `cadence-core`: configuration and errors shared by the timer and the CLI.

pub mod config;
pub mod error;

pub use config::{CadenceConfig, JobConfig, TimerConfig};
pub use error::{CadenceError, Result};
