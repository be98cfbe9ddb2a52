//! Test utilities for module loader testing
//!
//! Provides an isolated catalog directory, module file helpers and a
//! scriptable in-process runner that records what it executed.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use modgate::config::LoaderConfig;
use modgate::module::{ExecutionOutput, ModuleDescriptor, ModuleManager, ModuleRunner};

/// Test fixture for loader tests
pub struct LoaderFixture {
    /// Temporary directory holding everything
    pub temp_dir: TempDir,
    /// Catalog root
    pub modules_dir: PathBuf,
    /// Loader configuration rooted in the temporary directory
    pub config: LoaderConfig,
}

impl LoaderFixture {
    /// Create a fixture with an empty catalog
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let mut config = LoaderConfig::rooted_at(temp_dir.path());
        config.signing_key = Some("test-key".to_string());
        std::fs::create_dir_all(&config.modules_dir).expect("modules dir");

        Self {
            modules_dir: config.modules_dir.clone(),
            temp_dir,
            config,
        }
    }

    /// Write `<name>.module` at the catalog root with owner-only mode
    pub fn write_module(&self, name: &str, deps: &[&str]) -> PathBuf {
        self.write_module_in(None, name, deps)
    }

    /// Write a module in a subdirectory of the catalog root
    pub fn write_module_in(&self, subdir: Option<&str>, name: &str, deps: &[&str]) -> PathBuf {
        let body = format!(
            "# {name} module\nMODULE_DESCRIPTION=\"{name} support\"\nMODULE_VERSION=\"1.0.0\"\nMODULE_DEPENDENCIES=\"{}\"\n\necho \"{name} ready\"\n",
            deps.join(" ")
        );
        self.write_raw_in(subdir, name, &body)
    }

    /// Write a module with exact content
    pub fn write_raw(&self, name: &str, content: &str) -> PathBuf {
        self.write_raw_in(None, name, content)
    }

    fn write_raw_in(&self, subdir: Option<&str>, name: &str, content: &str) -> PathBuf {
        let dir = match subdir {
            Some(subdir) => self.modules_dir.join(subdir),
            None => self.modules_dir.clone(),
        };
        std::fs::create_dir_all(&dir).expect("module dir");
        let path = dir.join(format!("{}.module", name));
        std::fs::write(&path, content).expect("write module");
        set_mode(&path, 0o600);
        path
    }

    /// Path of a file in the temporary directory, outside the catalog
    pub fn scratch_path(&self, file: &str) -> PathBuf {
        self.temp_dir.path().join(file)
    }

    /// Manager over this fixture's configuration
    pub fn manager(&self, runner: Arc<MockRunner>) -> ModuleManager {
        ModuleManager::with_runner(self.config.clone(), runner)
    }

    /// Lines of the enabled list
    pub fn enabled_lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.config.enabled_list_path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Set file permission bits
pub fn set_mode(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).expect("chmod");
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}

/// In-process runner with scripted delays and failures
#[derive(Default)]
pub struct MockRunner {
    delay: Duration,
    failures: HashSet<String>,
    cancel_on: Option<(Option<String>, CancellationToken)>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    runs: Mutex<Vec<String>>,
}

impl MockRunner {
    /// Runner where every module succeeds immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Every module takes `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The named modules fail execution
    pub fn failing(mut self, names: &[&str]) -> Self {
        self.failures = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Cancel `token` when `name` starts executing
    pub fn cancel_when(mut self, name: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((Some(name.to_string()), token));
        self
    }

    /// Cancel `token` as soon as any module starts executing
    pub fn cancel_on_first_run(mut self, token: CancellationToken) -> Self {
        self.cancel_on = Some((None, token));
        self
    }

    /// Wrap in an `Arc` for the manager
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Modules executed, in start order
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }

    /// How many times `name` executed
    pub fn run_count(&self, name: &str) -> usize {
        self.runs().iter().filter(|n| *n == name).count()
    }

    /// Most modules observed executing at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Position of `name` in start order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.runs().iter().position(|n| n == name)
    }
}

#[async_trait]
impl ModuleRunner for MockRunner {
    async fn run(&self, descriptor: &ModuleDescriptor) -> Result<ExecutionOutput, String> {
        let started = Instant::now();
        self.runs.lock().unwrap().push(descriptor.name.clone());

        if let Some((trigger, token)) = &self.cancel_on {
            if trigger.as_ref().map_or(true, |name| *name == descriptor.name) {
                token.cancel();
            }
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failures.contains(&descriptor.name) {
            return Err("simulated failure".to_string());
        }
        Ok(ExecutionOutput {
            stdout: format!("{} ready\n", descriptor.name),
            stderr: String::new(),
            exit_code: Some(0),
            duration: started.elapsed(),
        })
    }
}
