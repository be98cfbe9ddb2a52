//! Wave executor
//!
//! Runs a load plan wave by wave. Modules inside a wave have no dependencies
//! on each other and run concurrently under a semaphore bound; the next wave
//! starts only after every task of the current one has finished. A failure
//! marks every transitive dependent `Skipped` before the next wave, so later
//! waves simply pass over them.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::module::loader::attempt::gate_and_run;
use crate::module::registry::{Catalog, DependencyGraph, LoadPlan, StateRegistry};
use crate::module::security::SecurityGate;
use crate::module::traits::{ModuleDescriptor, ModuleError, ModuleRunner, ModuleState};

/// Summary of one executor run
#[derive(Debug, Clone, Default)]
pub struct ExecutionSummary {
    /// Waves that started
    pub waves_started: usize,
    /// Modules that executed successfully
    pub loaded: usize,
    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
}

/// Bounded-concurrency, wave-based executor
pub struct WaveExecutor {
    registry: Arc<StateRegistry>,
    gate: Arc<SecurityGate>,
    runner: Arc<dyn ModuleRunner>,
    max_concurrency: NonZeroUsize,
    force: bool,
    ignore_missing: bool,
}

impl WaveExecutor {
    /// Create an executor
    pub fn new(
        registry: Arc<StateRegistry>,
        gate: Arc<SecurityGate>,
        runner: Arc<dyn ModuleRunner>,
        max_concurrency: NonZeroUsize,
    ) -> Self {
        Self {
            registry,
            gate,
            runner,
            max_concurrency,
            force: false,
            ignore_missing: false,
        }
    }

    /// Bypass security rejection for every module in the run
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Run modules whose dependencies are missing from the catalog
    pub fn ignore_missing_dependencies(mut self, ignore: bool) -> Self {
        self.ignore_missing = ignore;
        self
    }

    /// Configured concurrency bound
    pub fn max_concurrency(&self) -> NonZeroUsize {
        self.max_concurrency
    }

    /// Execute `plan` over the modules of `graph`
    ///
    /// Every module of the graph starts the run `Unloaded` and ends it in a
    /// terminal state.
    pub async fn execute(
        &self,
        catalog: &Catalog,
        graph: &DependencyGraph,
        plan: &LoadPlan,
        cancel: &CancellationToken,
    ) -> ExecutionSummary {
        let started = Instant::now();
        let mut summary = ExecutionSummary::default();
        self.registry.reset(graph.modules().iter().cloned()).await;

        self.settle_unplaced(graph, plan).await;

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency.get()));

        for (index, wave) in plan.waves.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            summary.waves_started += 1;
            debug!("Starting wave {} with {} modules", index + 1, wave.len());

            let mut tasks = JoinSet::new();
            for name in wave {
                if self.registry.state(name).await != ModuleState::Unloaded {
                    continue;
                }
                let Some(descriptor) = catalog.get(name) else {
                    continue;
                };
                if !self.ignore_missing {
                    if let Some(missing) = graph.missing_for(name).first() {
                        let reason = ModuleError::MissingDependency {
                            module: name.clone(),
                            dependency: missing.clone(),
                        };
                        warn!("{}", reason);
                        self.registry.mark_failed(name, reason).await;
                        continue;
                    }
                }

                tasks.spawn(run_module(
                    descriptor.clone(),
                    Arc::clone(&self.registry),
                    Arc::clone(&self.gate),
                    Arc::clone(&self.runner),
                    Arc::clone(&semaphore),
                    cancel.clone(),
                    self.force,
                ));
            }

            // Barrier: the whole wave finishes before the next one starts
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(true) => summary.loaded += 1,
                    Ok(false) => {}
                    Err(e) => error!("Module task aborted: {}", e),
                }
            }

            for name in wave {
                if self.registry.state(name).await == ModuleState::Loading {
                    let reason = ModuleError::ExecutionFailure {
                        module: name.clone(),
                        detail: "execution task aborted".to_string(),
                    };
                    self.registry.mark_failed(name, reason).await;
                }
            }

            self.propagate_failures(graph, wave).await;
        }

        if cancel.is_cancelled() {
            summary.cancelled = true;
            for name in graph.modules() {
                if self
                    .registry
                    .mark_skipped(name, ModuleError::Cancelled(name.clone()))
                    .await
                {
                    debug!("Module {} not started before cancellation", name);
                }
            }
        }

        info!(
            "Executed {} of {} waves in {:?} ({} loaded)",
            summary.waves_started,
            plan.waves.len(),
            started.elapsed(),
            summary.loaded
        );
        summary
    }

    /// Fail cycle members and skip what sits behind them
    async fn settle_unplaced(&self, graph: &DependencyGraph, plan: &LoadPlan) {
        if plan.unplaced.is_empty() {
            return;
        }
        let members: HashSet<String> = graph.cycle_members(&plan.unplaced).into_iter().collect();
        let unplaced: HashSet<&str> = plan.unplaced.iter().map(String::as_str).collect();
        let cycle = ModuleError::CyclicDependency(plan.unplaced.clone());

        for name in &plan.unplaced {
            if members.contains(name) {
                warn!("Module {} is part of a dependency cycle", name);
                self.registry.mark_failed(name, cycle.clone()).await;
            } else {
                let blocker = graph
                    .dependencies_of(name)
                    .iter()
                    .find(|d| unplaced.contains(d.as_str()))
                    .cloned()
                    .unwrap_or_default();
                self.registry
                    .mark_skipped(
                        name,
                        ModuleError::DependencyFailed {
                            module: name.clone(),
                            dependency: blocker,
                        },
                    )
                    .await;
            }
        }
    }

    /// Skip every transitive dependent of a failed or rejected module
    ///
    /// Walks the wave in plan order, so a dependent of several failures is
    /// attributed to the first one.
    async fn propagate_failures(&self, graph: &DependencyGraph, wave: &[String]) {
        for name in wave {
            let state = self.registry.state(name).await;
            if !matches!(state, ModuleState::Failed | ModuleState::Rejected) {
                continue;
            }
            for dependent in graph.transitive_dependents(name) {
                let reason = ModuleError::DependencyFailed {
                    module: dependent.clone(),
                    dependency: name.clone(),
                };
                if self.registry.mark_skipped(&dependent, reason).await {
                    info!("Skipping {}: dependency {} {}", dependent, name, state);
                }
            }
        }
    }
}

/// One module's task; returns whether the module loaded
async fn run_module(
    descriptor: ModuleDescriptor,
    registry: Arc<StateRegistry>,
    gate: Arc<SecurityGate>,
    runner: Arc<dyn ModuleRunner>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    force: bool,
) -> bool {
    let name = descriptor.name.clone();

    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = semaphore.acquire_owned() => permit.ok(),
    };
    let Some(_permit) = permit else {
        registry
            .mark_skipped(&name, ModuleError::Cancelled(name.clone()))
            .await;
        return false;
    };

    if let Err(e) = registry.begin_loading(&name, &[]).await {
        registry.mark_failed(&name, e).await;
        return false;
    }

    gate_and_run(&registry, &gate, runner.as_ref(), &descriptor, force)
        .await
        .is_ok()
}
