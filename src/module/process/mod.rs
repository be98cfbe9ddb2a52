//! Module execution
//!
//! Runs module payloads as isolated child processes.

pub mod runner;

pub use runner::ProcessRunner;
