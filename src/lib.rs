//! modgate - dependency-aware module loader
//!
//! Discovers independently authored module files, validates each one before
//! it runs, and executes them so that every module runs only after its
//! dependencies have completed successfully.
//!
//! ## Design Principles
//!
//! 1. **Nothing runs unchecked**: every module passes the security gate first
//! 2. **Dependencies first**: single enables resolve recursively, batch loads
//!    follow a topological plan
//! 3. **Failures stay local**: a failed module skips its dependents and
//!    nothing else
//! 4. **One source of truth**: all components share a single state registry

pub mod config;
pub mod module;
pub mod utils;

pub use config::{LoadScope, LoaderConfig};
pub use module::{
    LoadReport, ModuleDescriptor, ModuleError, ModuleManager, ModuleRunner, ModuleState,
};
