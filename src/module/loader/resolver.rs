//! Recursive dependency resolver
//!
//! Enables a single module by depth-first loading of its dependencies. The
//! shared state registry doubles as the cycle detector: reaching a module
//! that is still `Loading` means the resolution path has looped back.

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::module::loader::attempt::gate_and_run;
use crate::module::registry::{Catalog, StateRegistry};
use crate::module::security::SecurityGate;
use crate::module::traits::{ExecutionOutput, ModuleError, ModuleRunner, ModuleState};

/// Result of a successful enable
#[derive(Debug, Clone)]
pub enum EnableOutcome {
    /// Module was already loaded; nothing ran
    AlreadyLoaded,
    /// Module executed during this call
    Loaded(ExecutionOutput),
}

impl EnableOutcome {
    /// Whether the module executed during this call
    pub fn executed(&self) -> bool {
        matches!(self, EnableOutcome::Loaded(_))
    }
}

/// Loads one module and whatever it depends on
pub struct ModuleResolver {
    catalog: Arc<Catalog>,
    registry: Arc<StateRegistry>,
    gate: Arc<SecurityGate>,
    runner: Arc<dyn ModuleRunner>,
    ignore_missing: bool,
}

impl ModuleResolver {
    /// Create a resolver over a catalog
    pub fn new(
        catalog: Arc<Catalog>,
        registry: Arc<StateRegistry>,
        gate: Arc<SecurityGate>,
        runner: Arc<dyn ModuleRunner>,
    ) -> Self {
        Self {
            catalog,
            registry,
            gate,
            runner,
            ignore_missing: false,
        }
    }

    /// Let modules load even when a declared dependency is not in the catalog
    pub fn ignore_missing_dependencies(mut self, ignore: bool) -> Self {
        self.ignore_missing = ignore;
        self
    }

    /// Enable `name` after its dependencies
    ///
    /// `force` applies to the named module only: it bypasses security
    /// rejection and re-runs a module that is already loaded. Dependencies
    /// are loaded without force.
    pub async fn enable(&self, name: &str, force: bool) -> Result<EnableOutcome, ModuleError> {
        let mut chain = Vec::new();
        self.enable_inner(name, force, &mut chain).await
    }

    fn enable_inner<'a>(
        &'a self,
        name: &'a str,
        force: bool,
        chain: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<EnableOutcome, ModuleError>> {
        async move {
            let descriptor = self.catalog.require(name)?;

            match self.registry.state(name).await {
                ModuleState::Loaded if !force => {
                    debug!("Module {} already loaded", name);
                    return Ok(EnableOutcome::AlreadyLoaded);
                }
                ModuleState::Rejected if !force => {
                    let fingerprint = self.registry.rejected_fingerprint(name).await;
                    if fingerprint.as_deref() == Some(descriptor.security_fingerprint().as_str()) {
                        let reason = self.registry.failure(name).await.unwrap_or_else(|| {
                            ModuleError::OperationError(format!("Module {} was rejected", name))
                        });
                        return Err(reason);
                    }
                    info!("Module {} changed since it was rejected, checking again", name);
                }
                _ => {}
            }

            self.registry.begin_loading(name, chain).await?;
            chain.push(name.to_string());

            for dependency in &descriptor.dependencies {
                if !self.catalog.contains(dependency) {
                    if self.ignore_missing {
                        warn!(
                            "Module {} depends on {}, which is not in the catalog; continuing",
                            name, dependency
                        );
                        continue;
                    }
                    let reason = ModuleError::MissingDependency {
                        module: name.to_string(),
                        dependency: dependency.clone(),
                    };
                    warn!("{}", reason);
                    self.registry.mark_failed(name, reason.clone()).await;
                    chain.pop();
                    return Err(reason);
                }

                if self.registry.is_loaded(dependency).await {
                    continue;
                }

                debug!("Module {} needs {}", name, dependency);
                if let Err(e) = self.enable_inner(dependency, false, chain).await {
                    // Modules upstream of a cycle fail on their dependency
                    let reason = match e {
                        ModuleError::CyclicDependency(members)
                            if members.iter().any(|m| m == name) =>
                        {
                            ModuleError::CyclicDependency(members)
                        }
                        _ => ModuleError::DependencyFailed {
                            module: name.to_string(),
                            dependency: dependency.clone(),
                        },
                    };
                    warn!("{}", reason);
                    self.registry.mark_failed(name, reason.clone()).await;
                    chain.pop();
                    return Err(reason);
                }
            }

            chain.pop();
            info!("Enabling module: {}", name);
            gate_and_run(
                &self.registry,
                &self.gate,
                self.runner.as_ref(),
                descriptor,
                force,
            )
            .await
            .map(EnableOutcome::Loaded)
        }
        .boxed()
    }
}
