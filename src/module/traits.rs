//! Module system traits and interfaces
//!
//! Defines the lifecycle states, descriptor types, error kinds and the
//! runner seam through which module payloads are executed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Module lifecycle state
///
/// Every module known to the [`StateRegistry`](crate::module::registry::StateRegistry)
/// holds exactly one of these at any time. Failure detail for the terminal
/// non-success states is kept alongside the state, not inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    /// Module has not been attempted
    Unloaded,
    /// Module is resolving dependencies or executing
    Loading,
    /// Module payload ran successfully
    Loaded,
    /// Module payload, a dependency or the dependency graph failed
    Failed,
    /// Security gate refused the module
    Rejected,
    /// Module was never attempted because a dependency failed or the run was cancelled
    Skipped,
}

impl ModuleState {
    /// Whether this state ends a load attempt
    pub fn is_terminal(self) -> bool {
        !matches!(self, ModuleState::Unloaded | ModuleState::Loading)
    }

    /// Whether dependents may proceed past a module in this state
    pub fn is_success(self) -> bool {
        self == ModuleState::Loaded
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ModuleState::Unloaded => "unloaded",
            ModuleState::Loading => "loading",
            ModuleState::Loaded => "loaded",
            ModuleState::Failed => "failed",
            ModuleState::Rejected => "rejected",
            ModuleState::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Metadata extracted from the marker lines of a module file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// Declared dependencies in declaration order, duplicates collapsed
    pub dependencies: Vec<String>,
    /// Human-readable description
    pub description: Option<String>,
    /// Module version
    pub version: Option<String>,
}

/// Descriptor of a discovered module
///
/// Built by the catalog scanner without executing the module. Immutable once
/// built; a rescan replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Module name (unique identifier, file stem)
    pub name: String,
    /// Module file location
    pub path: PathBuf,
    /// Declared dependencies, in declaration order
    pub dependencies: Vec<String>,
    /// File permission bits at scan time (`None` where the platform has none)
    pub permission_mode: Option<u32>,
    /// Whether a detached signature file sits next to the module
    pub signature_present: bool,
    /// Human-readable description
    pub description: Option<String>,
    /// Module version
    pub version: Option<String>,
    /// SHA-256 of the file content (hex)
    pub content_hash: String,
}

impl ModuleDescriptor {
    /// Path of the detached signature for this module
    pub fn signature_path(&self) -> PathBuf {
        signature_path_for(&self.path)
    }

    /// Summary of everything the security gate looks at
    ///
    /// Two descriptors with the same fingerprint get the same gate decision.
    pub fn security_fingerprint(&self) -> String {
        let mode = self
            .permission_mode
            .map(|m| format!("{:o}", m))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{}:{}:{}",
            self.content_hash,
            mode,
            if self.signature_present { "signed" } else { "unsigned" }
        )
    }
}

/// Sibling signature path for a module file (`<file>.sig`)
pub fn signature_path_for(path: &std::path::Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".sig");
    PathBuf::from(os)
}

/// Side-channel data produced by a module execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Exit code where the runner has one
    pub exit_code: Option<i32>,
    /// Wall time spent executing
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Executes a module payload
///
/// The loader treats a module as an opaque unit of work: it never shares
/// interpreter state with the caller. Implementations return the captured
/// side-channel output on success and an error description on failure.
#[async_trait]
pub trait ModuleRunner: Send + Sync {
    /// Run the module described by `descriptor`
    async fn run(&self, descriptor: &ModuleDescriptor) -> Result<ExecutionOutput, String>;
}

/// Module system errors
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleError {
    #[error("Invalid module name: {0:?} (allowed: letters, digits, '_' and '-')")]
    InvalidName(String),

    #[error("Module not found: {name}{}", format_suggestions(.suggestions))]
    NotFound {
        name: String,
        suggestions: Vec<String>,
    },

    #[error("Module {name} rejected: file mode {mode:o} is not owner-only (expected {expected:o})")]
    PermissionRejected { name: String, mode: u32, expected: u32 },

    #[error("Module {0} rejected: signature does not match")]
    SignatureRejected(String),

    #[error("Module {0} rejected: signature required but none present")]
    SignatureMissing(String),

    #[error("Module {name} rejected: unsafe pattern detected ({pattern})")]
    UnsafePatternRejected { name: String, pattern: String },

    #[error("Module {module} depends on {dependency}, which is not in the catalog")]
    MissingDependency { module: String, dependency: String },

    #[error("Circular dependency among: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Module {module} not loaded: dependency {dependency} failed")]
    DependencyFailed { module: String, dependency: String },

    #[error("Module {module} failed: {detail}")]
    ExecutionFailure { module: String, detail: String },

    #[error("Module {0} skipped: load cancelled")]
    Cancelled(String),

    #[error("Module operation failed: {0}")]
    OperationError(String),
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {}?)", suggestions.join(", "))
    }
}

impl ModuleError {
    /// Whether this error came from the security gate
    pub fn is_security_rejection(&self) -> bool {
        matches!(
            self,
            ModuleError::PermissionRejected { .. }
                | ModuleError::SignatureRejected(_)
                | ModuleError::SignatureMissing(_)
                | ModuleError::UnsafePatternRejected { .. }
        )
    }
}

impl From<std::io::Error> for ModuleError {
    fn from(e: std::io::Error) -> Self {
        ModuleError::OperationError(e.to_string())
    }
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::OperationError(format!("Serialization error: {}", e))
    }
}
