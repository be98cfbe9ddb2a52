//! Module system for modgate
//!
//! Discovers module files, validates each through the security gate, and
//! loads them in dependency order.
//!
//! ## Architecture
//!
//! - **Registry**: catalog scanning, metadata cache, dependency graph and the
//!   shared state registry
//! - **Security**: permission, signature and content checks before execution
//! - **Loader**: recursive single-module enable and the wave executor
//! - **Process**: module payloads run as isolated child processes

pub mod loader;
pub mod manager;
pub mod process;
pub mod registry;
pub mod security;
pub mod traits;
pub mod validation;

pub use loader::{EnableOutcome, ModuleResolver, WaveExecutor};
pub use manager::{DisableOutcome, LoadReport, ModuleInfo, ModuleListing, ModuleManager};
pub use process::ProcessRunner;
pub use registry::{Catalog, DependencyGraph, LoadPlan, StateEntry, StateRegistry};
pub use security::{GateDecision, SecurityGate, SignatureStatus};
pub use traits::{
    ExecutionOutput, ModuleDescriptor, ModuleError, ModuleMetadata, ModuleRunner, ModuleState,
};
