//! Module dependency resolution
//!
//! Builds the dependency graph (dependency -> dependents) over a catalog and
//! computes load order with Kahn's algorithm, both as a flat order and as
//! waves of mutually independent modules.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

use crate::module::traits::{ModuleDescriptor, ModuleError};

/// Directed dependency graph over a catalog
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Module names in catalog discovery order
    order: Vec<String>,
    /// Declared dependencies present in the catalog, per module
    dependencies: HashMap<String, Vec<String>>,
    /// Reverse edges: dependency -> dependents, in discovery order
    dependents: HashMap<String, Vec<String>>,
    /// Number of in-catalog dependencies per module
    in_degree: HashMap<String, usize>,
    /// Declared dependencies absent from the catalog, per module
    missing: HashMap<String, Vec<String>>,
}

/// Batch load plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadPlan {
    /// Topological order (dependencies first)
    pub order: Vec<String>,
    /// Consecutive groups of modules with no dependency among them
    pub waves: Vec<Vec<String>>,
    /// Modules that could not be placed because of cycles, in discovery order
    pub unplaced: Vec<String>,
}

impl LoadPlan {
    /// Whether every module was placed
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    /// The cycle error for the unplaced remainder, if any
    pub fn cycle_error(&self) -> Option<ModuleError> {
        (!self.unplaced.is_empty()).then(|| ModuleError::CyclicDependency(self.unplaced.clone()))
    }
}

impl DependencyGraph {
    /// Build the graph from a catalog
    ///
    /// Dependencies that name modules outside the catalog do not become
    /// edges; they are recorded as missing against the dependent.
    pub fn build(catalog: &[ModuleDescriptor]) -> Self {
        let names: HashSet<&str> = catalog.iter().map(|d| d.name.as_str()).collect();
        let mut graph = DependencyGraph::default();

        for descriptor in catalog {
            graph.order.push(descriptor.name.clone());
            graph.in_degree.entry(descriptor.name.clone()).or_insert(0);
        }

        for descriptor in catalog {
            let mut present = Vec::new();
            for dep in &descriptor.dependencies {
                if names.contains(dep.as_str()) {
                    present.push(dep.clone());
                    graph
                        .dependents
                        .entry(dep.clone())
                        .or_default()
                        .push(descriptor.name.clone());
                } else {
                    warn!(
                        "Module {} declares missing dependency {}",
                        descriptor.name, dep
                    );
                    graph
                        .missing
                        .entry(descriptor.name.clone())
                        .or_default()
                        .push(dep.clone());
                }
            }
            graph
                .in_degree
                .insert(descriptor.name.clone(), present.len());
            graph.dependencies.insert(descriptor.name.clone(), present);
        }

        debug!(
            "Dependency graph built: {} modules, {} with missing dependencies",
            graph.order.len(),
            graph.missing.len()
        );
        graph
    }

    /// Module names in discovery order
    pub fn modules(&self) -> &[String] {
        &self.order
    }

    /// Whether the graph contains a module
    pub fn contains(&self, name: &str) -> bool {
        self.in_degree.contains_key(name)
    }

    /// In-catalog dependencies of a module
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.dependencies.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct dependents of a module
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of unresolved in-catalog dependencies
    pub fn in_degree(&self, name: &str) -> usize {
        self.in_degree.get(name).copied().unwrap_or(0)
    }

    /// Declared dependencies of `name` absent from the catalog
    pub fn missing_for(&self, name: &str) -> &[String] {
        self.missing.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All missing-dependency conditions, as errors
    pub fn missing_dependencies(&self) -> Vec<ModuleError> {
        self.order
            .iter()
            .flat_map(|module| {
                self.missing_for(module)
                    .iter()
                    .map(move |dep| ModuleError::MissingDependency {
                        module: module.clone(),
                        dependency: dep.clone(),
                    })
            })
            .collect()
    }

    /// Every module that transitively depends on `name`, breadth-first
    pub fn transitive_dependents(&self, name: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        let mut result = Vec::new();
        queue.push_back(name);
        seen.insert(name);

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents_of(current) {
                if seen.insert(dependent.as_str()) {
                    result.push(dependent.clone());
                    queue.push_back(dependent.as_str());
                }
            }
        }

        result
    }

    /// Every module `name` transitively depends on, plus `name` itself
    pub fn dependency_closure<'a, I>(&self, roots: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut closure = HashSet::new();
        let mut stack: Vec<String> = roots
            .into_iter()
            .filter(|n| self.contains(n))
            .map(str::to_string)
            .collect();

        while let Some(current) = stack.pop() {
            if closure.insert(current.clone()) {
                stack.extend(self.dependencies_of(&current).iter().cloned());
            }
        }

        closure
    }

    /// Restrict the graph to a subset of modules
    ///
    /// Edges leaving the subset are dropped; the subset is expected to be
    /// closed under dependencies (see [`dependency_closure`](Self::dependency_closure)).
    pub fn subgraph(&self, keep: &HashSet<String>) -> Self {
        let mut graph = DependencyGraph::default();
        for name in self.order.iter().filter(|n| keep.contains(*n)) {
            let deps: Vec<String> = self
                .dependencies_of(name)
                .iter()
                .filter(|d| keep.contains(*d))
                .cloned()
                .collect();
            for dep in &deps {
                graph
                    .dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(name.clone());
            }
            graph.order.push(name.clone());
            graph.in_degree.insert(name.clone(), deps.len());
            graph.dependencies.insert(name.clone(), deps);
            if let Some(missing) = self.missing.get(name) {
                graph.missing.insert(name.clone(), missing.clone());
            }
        }
        graph
    }

    /// Compute the batch load plan with Kahn's algorithm
    ///
    /// The ready set is seeded in discovery order. Waves are formed by
    /// peeling off every zero in-degree module at once before decrementing
    /// for the next wave, so the flat order is the concatenation of waves.
    pub fn plan(&self) -> LoadPlan {
        let mut in_degree = self.in_degree.clone();
        let mut ready: Vec<String> = self
            .order
            .iter()
            .filter(|n| in_degree.get(*n).copied() == Some(0))
            .cloned()
            .collect();

        let mut plan = LoadPlan::default();
        let mut placed: HashSet<String> = HashSet::new();

        while !ready.is_empty() {
            let wave = std::mem::take(&mut ready);
            let mut next: HashSet<String> = HashSet::new();

            for module in &wave {
                placed.insert(module.clone());
                plan.order.push(module.clone());
                for dependent in self.dependents_of(module) {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.insert(dependent.clone());
                        }
                    }
                }
            }

            // Keep waves in discovery order for determinism
            ready = self
                .order
                .iter()
                .filter(|n| next.contains(*n))
                .cloned()
                .collect();
            plan.waves.push(wave);
        }

        plan.unplaced = self
            .order
            .iter()
            .filter(|n| !placed.contains(*n))
            .cloned()
            .collect();

        if !plan.unplaced.is_empty() {
            warn!("Circular dependency detected among: {:?}", plan.unplaced);
        }
        debug!("Load plan: {} waves, order {:?}", plan.waves.len(), plan.order);
        plan
    }

    /// Flat topological order, failing on any cycle
    pub fn topological_order(&self) -> Result<Vec<String>, ModuleError> {
        let plan = self.plan();
        match plan.cycle_error() {
            Some(err) => Err(err),
            None => Ok(plan.order),
        }
    }

    /// Split the unplaced remainder of a plan into cycle members and modules
    /// that only sit downstream of a cycle
    ///
    /// Downstream modules are peeled off by repeatedly removing unplaced
    /// modules with no unplaced dependents; whatever survives lies on or
    /// between cycles.
    pub fn cycle_members(&self, unplaced: &[String]) -> Vec<String> {
        let mut remaining: HashSet<&str> = unplaced.iter().map(String::as_str).collect();

        loop {
            let sinks: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|n| {
                    !self
                        .dependents_of(n)
                        .iter()
                        .any(|d| remaining.contains(d.as_str()))
                })
                .collect();
            if sinks.is_empty() {
                break;
            }
            for sink in sinks {
                remaining.remove(sink);
            }
        }

        unplaced
            .iter()
            .filter(|n| remaining.contains(n.as_str()))
            .cloned()
            .collect()
    }
}
