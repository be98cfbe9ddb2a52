//! Subprocess module runner
//!
//! Executes each module file with the configured interpreter as an isolated
//! child process. Nothing the module does leaks into the loader's state; its
//! output comes back as side-channel data.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::LoaderConfig;
use crate::module::traits::{ExecutionOutput, ModuleDescriptor, ModuleRunner};

/// Runs module files as child processes
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// Interpreter binary
    interpreter: String,
    /// Per-module execution timeout
    timeout: Duration,
}

impl ProcessRunner {
    /// Create a runner
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    /// Create a runner from loader configuration
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(
            config.interpreter.clone(),
            Duration::from_secs(config.execution_timeout_secs),
        )
    }
}

#[async_trait]
impl ModuleRunner for ProcessRunner {
    async fn run(&self, descriptor: &ModuleDescriptor) -> Result<ExecutionOutput, String> {
        info!("Executing module: {}", descriptor.name);
        let started = Instant::now();

        let mut command = Command::new(&self.interpreter);
        command
            .arg(&descriptor.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("MODGATE_MODULE_NAME", &descriptor.name)
            .env("MODGATE_MODULE_PATH", &descriptor.path)
            .kill_on_drop(true);
        if let Some(dir) = descriptor.path.parent() {
            command.current_dir(dir);
        }

        debug!("Spawning process: {:?}", command);
        let child = command
            .spawn()
            .map_err(|e| format!("Failed to spawn {}: {}", self.interpreter, e))?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| format!("Failed to wait for module process: {}", e))?,
            // Dropping the future drops the child, which kills it
            Err(_) => return Err(format!("timed out after {:?}", self.timeout)),
        };

        let result = ExecutionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            duration: started.elapsed(),
        };

        if output.status.success() {
            debug!(
                "Module {} exited cleanly in {:?}",
                descriptor.name, result.duration
            );
            Ok(result)
        } else {
            let stderr = result.stderr.trim();
            let mut detail = match result.exit_code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            };
            if !stderr.is_empty() {
                detail.push_str(": ");
                detail.push_str(stderr.lines().last().unwrap_or(stderr));
            }
            Err(detail)
        }
    }
}
