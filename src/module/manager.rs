//! Module manager
//!
//! Entry point for every caller-facing operation. Owns the catalog, the
//! shared state registry and the metadata cache, and wires discovery, the
//! security gate, the resolver and the wave executor together.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{LoadScope, LoaderConfig};
use crate::module::loader::{EnableOutcome, ModuleResolver, WaveExecutor};
use crate::module::process::ProcessRunner;
use crate::module::registry::{
    Catalog, DependencyGraph, EnabledList, MetadataCache, ModuleDiscovery, StateEntry,
    StateRegistry,
};
use crate::module::security::{restrict_mode, SecurityGate, SignatureStatus};
use crate::module::traits::{
    duration_millis, signature_path_for, ModuleDescriptor, ModuleError, ModuleRunner,
    ModuleState,
};
use crate::module::validation::validate_name;

/// One row of `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleListing {
    pub name: String,
    /// Path relative to the catalog root
    pub path: PathBuf,
    pub version: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub state: ModuleState,
}

/// Everything known about one module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub descriptor: ModuleDescriptor,
    pub state: StateEntry,
    pub enabled: bool,
    pub signature: SignatureStatus,
    /// Modules that declare this one as a dependency
    pub dependents: Vec<String>,
    /// Declared dependencies absent from the catalog
    pub missing_dependencies: Vec<String>,
}

/// Result of `disable`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableOutcome {
    /// Whether the module was on the enabled list
    pub was_enabled: bool,
    /// Enabled modules that still declare the disabled one as a dependency
    pub enabled_dependents: Vec<String>,
}

/// Result of a batch load
///
/// Per-module failures are reported here, never as an error of the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    /// Ready sets, in execution order
    pub waves: Vec<Vec<String>>,
    /// Flat topological order
    pub order: Vec<String>,
    /// Modules the planner could not place
    pub cyclic: Vec<String>,
    /// Enabled-list names with no module in the catalog
    pub unknown_enabled: Vec<String>,
    /// Final state of every module in scope
    pub states: BTreeMap<String, StateEntry>,
    /// Whether the run was cancelled before finishing
    pub cancelled: bool,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl LoadReport {
    /// Modules that ended in `state`
    pub fn with_state(&self, state: ModuleState) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, entry)| entry.state == state)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// State a module ended in
    pub fn state_of(&self, name: &str) -> Option<ModuleState> {
        self.states.get(name).map(|entry| entry.state)
    }

    /// Whether every module in scope loaded
    pub fn all_loaded(&self) -> bool {
        self.states.values().all(|entry| entry.state.is_success())
    }
}

/// Module manager coordinates discovery, validation and loading
pub struct ModuleManager {
    config: LoaderConfig,
    discovery: ModuleDiscovery,
    enabled: EnabledList,
    registry: Arc<StateRegistry>,
    cache: Mutex<MetadataCache>,
    gate: Arc<SecurityGate>,
    runner: Arc<dyn ModuleRunner>,
    catalog: RwLock<Arc<Catalog>>,
}

impl ModuleManager {
    /// Create a manager that executes modules as child processes
    pub fn new(config: LoaderConfig) -> Self {
        let runner = Arc::new(ProcessRunner::from_config(&config));
        Self::with_runner(config, runner)
    }

    /// Create a manager with a custom module runner
    pub fn with_runner(config: LoaderConfig, runner: Arc<dyn ModuleRunner>) -> Self {
        let cache = match &config.cache_path {
            Some(path) => MetadataCache::load(path),
            None => MetadataCache::new(),
        };

        Self {
            discovery: ModuleDiscovery::with_extension(
                &config.modules_dir,
                &config.module_extension,
            ),
            enabled: EnabledList::new(&config.enabled_list_path),
            registry: Arc::new(StateRegistry::new()),
            cache: Mutex::new(cache),
            gate: Arc::new(SecurityGate::from_config(&config)),
            runner,
            catalog: RwLock::new(Arc::new(Catalog::default())),
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Shared state registry
    pub fn registry(&self) -> Arc<StateRegistry> {
        Arc::clone(&self.registry)
    }

    /// Catalog from the most recent scan
    pub async fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&*self.catalog.read().await)
    }

    /// Cache hit/parse counters
    pub async fn cache_stats(&self) -> crate::module::registry::CacheStats {
        self.cache.lock().await.stats()
    }

    /// Rescan the catalog, replacing every descriptor
    pub async fn rescan(&self) -> Result<Arc<Catalog>, ModuleError> {
        let descriptors = {
            let mut cache = self.cache.lock().await;
            let descriptors = self.discovery.discover_modules(&mut cache, true)?;
            cache.retain_paths(descriptors.iter().map(|d| d.path.as_path()));
            if let Some(path) = &self.config.cache_path {
                if let Err(e) = cache.save(path) {
                    warn!("Failed to persist metadata cache: {}", e);
                }
            }
            descriptors
        };

        let catalog = Arc::new(Catalog::new(descriptors));
        for gone in self.registry.retain(catalog.names()).await {
            info!("Module {} no longer in the catalog", gone);
        }
        self.registry
            .register(catalog.names().map(str::to_string))
            .await;
        *self.catalog.write().await = Arc::clone(&catalog);
        Ok(catalog)
    }

    /// Enable a module and its dependencies, then add it to the enabled list
    ///
    /// `force` (or the configured force toggle) bypasses security rejection
    /// and re-runs a module that is already loaded.
    pub async fn enable(&self, name: &str, force: bool) -> Result<EnableOutcome, ModuleError> {
        validate_name(name)?;
        let catalog = self.rescan().await?;
        catalog.require(name)?;

        let resolver = ModuleResolver::new(
            catalog,
            Arc::clone(&self.registry),
            Arc::clone(&self.gate),
            Arc::clone(&self.runner),
        )
        .ignore_missing_dependencies(self.config.ignore_missing_dependencies);

        let outcome = resolver.enable(name, force || self.config.force).await?;
        if self.enabled.add(name)? {
            info!("Module {} enabled", name);
        }
        Ok(outcome)
    }

    /// Remove a module from the enabled list and reset its state
    ///
    /// Enabled modules that still depend on it are reported, not touched.
    pub async fn disable(&self, name: &str) -> Result<DisableOutcome, ModuleError> {
        validate_name(name)?;
        let catalog = self.rescan().await?;

        let was_enabled = self.enabled.remove(name)?;
        self.registry.unload(name).await;
        if !was_enabled {
            debug!("Module {} was not enabled", name);
            return Ok(DisableOutcome::default());
        }

        let enabled: HashSet<String> = self.enabled.read()?.into_iter().collect();
        let enabled_dependents: Vec<String> = catalog
            .descriptors()
            .iter()
            .filter(|d| enabled.contains(&d.name) && d.dependencies.iter().any(|dep| dep == name))
            .map(|d| d.name.clone())
            .collect();
        for dependent in &enabled_dependents {
            warn!("Enabled module {} still depends on {}", dependent, name);
        }

        info!("Module {} disabled", name);
        Ok(DisableOutcome {
            was_enabled,
            enabled_dependents,
        })
    }

    /// Catalog listing sorted by name; non-recursive lists the top level only
    pub async fn list(&self, recursive: bool) -> Result<Vec<ModuleListing>, ModuleError> {
        let catalog = self.rescan().await?;
        let enabled: HashSet<String> = self.enabled.read()?.into_iter().collect();
        let root = self.discovery.modules_dir();

        let mut listing = Vec::new();
        for descriptor in catalog.descriptors() {
            if !recursive && descriptor.path.parent() != Some(root) {
                continue;
            }
            listing.push(ModuleListing {
                name: descriptor.name.clone(),
                path: descriptor
                    .path
                    .strip_prefix(root)
                    .unwrap_or(descriptor.path.as_path())
                    .to_path_buf(),
                version: descriptor.version.clone(),
                description: descriptor.description.clone(),
                enabled: enabled.contains(&descriptor.name),
                state: self.registry.state(&descriptor.name).await,
            });
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    /// Descriptor, state, signature status and reverse dependencies of a module
    pub async fn info(&self, name: &str) -> Result<ModuleInfo, ModuleError> {
        validate_name(name)?;
        let catalog = self.rescan().await?;
        let descriptor = catalog.require(name)?.clone();
        let graph = DependencyGraph::build(catalog.descriptors());

        let signature = match std::fs::read(&descriptor.path) {
            Ok(bytes) => self.gate.signature_status(&descriptor.path, &bytes),
            Err(e) => {
                warn!("Failed to read module {:?}: {}", descriptor.path, e);
                SignatureStatus::Invalid
            }
        };

        Ok(ModuleInfo {
            state: self.registry.entry(name).await,
            enabled: self.enabled.contains(name)?,
            signature,
            dependents: graph.dependents_of(name).to_vec(),
            missing_dependencies: graph.missing_for(name).to_vec(),
            descriptor,
        })
    }

    /// Snapshot of every module's state
    pub async fn status(&self) -> BTreeMap<String, StateEntry> {
        self.registry.snapshot().await
    }

    /// Write a detached signature for a module; returns the signature path
    pub async fn sign(&self, name: &str) -> Result<PathBuf, ModuleError> {
        validate_name(name)?;
        let catalog = self.rescan().await?;
        let descriptor = catalog.require(name)?;

        self.gate.signing_key().sign_file(&descriptor.path)?;
        let sig_path = descriptor.signature_path();
        info!("Signed module {} -> {:?}", name, sig_path);
        Ok(sig_path)
    }

    /// Copy `source` into the catalog as `name`
    ///
    /// The file lands at `<modules_dir>/<subdir>/<name>.<ext>` with the
    /// required mode, and is signed when signature verification is on. An
    /// existing module of the same name is replaced only with `force`.
    pub async fn install(
        &self,
        source: &Path,
        name: &str,
        subdir: Option<&str>,
        force: bool,
    ) -> Result<PathBuf, ModuleError> {
        validate_name(name)?;
        let force = force || self.config.force;

        let mut dest_dir = self.discovery.modules_dir().to_path_buf();
        if let Some(subdir) = subdir.filter(|s| !s.is_empty()) {
            let relative = Path::new(subdir);
            if !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            {
                return Err(ModuleError::OperationError(format!(
                    "Invalid subdirectory {:?}: must be a relative path without '..'",
                    subdir
                )));
            }
            dest_dir.push(relative);
        }
        let dest = dest_dir.join(format!("{}.{}", name, self.config.module_extension));

        let catalog = self.rescan().await?;
        let replaced = match catalog.get(name) {
            Some(existing) if !force => {
                return Err(ModuleError::OperationError(format!(
                    "Module {} already installed at {:?} (use force to replace)",
                    name, existing.path
                )));
            }
            Some(existing) if existing.path != dest => Some(existing.path.clone()),
            _ => None,
        };
        if dest.exists() && !force {
            return Err(ModuleError::OperationError(format!(
                "{:?} already exists (use force to replace)",
                dest
            )));
        }

        std::fs::create_dir_all(&dest_dir).map_err(|e| {
            ModuleError::OperationError(format!("Failed to create {:?}: {}", dest_dir, e))
        })?;
        std::fs::copy(source, &dest).map_err(|e| {
            ModuleError::OperationError(format!(
                "Failed to copy {:?} to {:?}: {}",
                source, dest, e
            ))
        })?;
        restrict_mode(&dest, self.config.required_mode)?;

        if self.config.verify_signatures {
            self.gate.signing_key().sign_file(&dest)?;
        }
        let mut cache = self.cache.lock().await;
        cache.invalidate_path(&dest);
        if let Some(old) = replaced {
            remove_module_file(&old)?;
            cache.invalidate_path(&old);
            info!("Removed previous copy of {} at {:?}", name, old);
        }
        drop(cache);

        info!("Installed module {} at {:?}", name, dest);
        Ok(dest)
    }

    /// Load the configured scope through the planner and the wave executor
    ///
    /// Only catalog or enabled-list I/O errors fail the call; every module
    /// outcome is in the report.
    pub async fn load_all(&self, cancel: CancellationToken) -> Result<LoadReport, ModuleError> {
        let started = Instant::now();
        let catalog = self.rescan().await?;
        let full_graph = DependencyGraph::build(catalog.descriptors());

        let mut unknown_enabled = Vec::new();
        let graph = match self.config.load_scope {
            LoadScope::Catalog => full_graph,
            LoadScope::Enabled => {
                let names = self.enabled.read()?;
                for name in &names {
                    if !catalog.contains(name) {
                        warn!("Enabled module {} is not in the catalog", name);
                        unknown_enabled.push(name.clone());
                    }
                }
                let closure = full_graph.dependency_closure(names.iter().map(String::as_str));
                full_graph.subgraph(&closure)
            }
        };

        for missing in graph.missing_dependencies() {
            warn!("{}", missing);
        }

        let plan = graph.plan();
        info!(
            "Loading {} modules in {} waves",
            graph.modules().len(),
            plan.waves.len()
        );

        let max_concurrency =
            NonZeroUsize::new(self.config.max_concurrency).unwrap_or(NonZeroUsize::MIN);
        let executor = WaveExecutor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.gate),
            Arc::clone(&self.runner),
            max_concurrency,
        )
        .force(self.config.force)
        .ignore_missing_dependencies(self.config.ignore_missing_dependencies);

        let summary = executor.execute(&catalog, &graph, &plan, &cancel).await;

        let in_scope: HashSet<&str> = graph.modules().iter().map(String::as_str).collect();
        let states: BTreeMap<String, StateEntry> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|(name, _)| in_scope.contains(name.as_str()))
            .collect();

        let report = LoadReport {
            waves: plan.waves,
            order: plan.order,
            cyclic: plan.unplaced,
            unknown_enabled,
            states,
            cancelled: summary.cancelled,
            elapsed: started.elapsed(),
        };
        info!(
            "Load finished: {} loaded, {} failed, {} rejected, {} skipped",
            report.with_state(ModuleState::Loaded).len(),
            report.with_state(ModuleState::Failed).len(),
            report.with_state(ModuleState::Rejected).len(),
            report.with_state(ModuleState::Skipped).len()
        );
        Ok(report)
    }
}

/// Delete a module file and its detached signature, if any
fn remove_module_file(path: &Path) -> Result<(), ModuleError> {
    for file in [path.to_path_buf(), signature_path_for(path)] {
        match std::fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ModuleError::OperationError(format!(
                    "Failed to remove {:?}: {}",
                    file, e
                )))
            }
        }
    }
    Ok(())
}
