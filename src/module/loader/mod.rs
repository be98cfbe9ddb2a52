//! Module loading
//!
//! On-demand single-module enable through the recursive resolver, and batch
//! loading of a whole plan through the wave executor.

mod attempt;
pub mod executor;
pub mod resolver;

pub use executor::{ExecutionSummary, WaveExecutor};
pub use resolver::{EnableOutcome, ModuleResolver};
