//! Discovered module catalog

use std::collections::HashMap;

use crate::module::traits::{ModuleDescriptor, ModuleError};
use crate::module::validation::suggest_names;

/// The set of discovered module descriptors, in discovery order
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    modules: Vec<ModuleDescriptor>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog; later duplicates of a name are ignored
    pub fn new(modules: Vec<ModuleDescriptor>) -> Self {
        let mut catalog = Catalog::default();
        for descriptor in modules {
            if !catalog.index.contains_key(&descriptor.name) {
                catalog
                    .index
                    .insert(descriptor.name.clone(), catalog.modules.len());
                catalog.modules.push(descriptor);
            }
        }
        catalog
    }

    /// Descriptor by name
    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.index.get(name).map(|&i| &self.modules[i])
    }

    /// Descriptor by name, or `NotFound` with near-match suggestions
    pub fn require(&self, name: &str) -> Result<&ModuleDescriptor, ModuleError> {
        self.get(name).ok_or_else(|| ModuleError::NotFound {
            name: name.to_string(),
            suggestions: suggest_names(name, self.names()),
        })
    }

    /// Whether the catalog has a module
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Module names in discovery order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|d| d.name.as_str())
    }

    /// Descriptors in discovery order
    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// Number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
