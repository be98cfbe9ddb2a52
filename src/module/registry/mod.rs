//! Module registry
//!
//! Catalog discovery, metadata markers and cache, dependency graph, and the
//! shared state registry.

pub mod cache;
pub mod catalog;
pub mod dependencies;
pub mod discovery;
pub mod enabled;
pub mod manifest;
pub mod state;

pub use cache::{content_hash, CacheEntry, CacheStats, MetadataCache};
pub use catalog::Catalog;
pub use dependencies::{DependencyGraph, LoadPlan};
pub use discovery::ModuleDiscovery;
pub use enabled::EnabledList;
pub use manifest::parse_markers;
pub use state::{StateEntry, StateRegistry};
