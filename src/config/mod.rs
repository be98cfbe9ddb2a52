//! Configuration management for modgate
//!
//! Handles configuration loading (defaults, TOML file, environment toggles)
//! and validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::module::registry::discovery::DEFAULT_MODULE_EXTENSION;
use crate::module::security::OWNER_READ_WRITE;
use crate::utils::{env_flag, env_int, env_opt};

/// Environment variable prefix for configuration toggles
pub const ENV_PREFIX: &str = "MODGATE_";

/// Which modules a batch load covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadScope {
    /// Every module in the catalog
    #[default]
    Catalog,
    /// Modules on the enabled list plus their transitive dependencies
    Enabled,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "modgate=debug"); `RUST_LOG` takes precedence
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON log lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Catalog root containing module files
    pub modules_dir: PathBuf,

    /// Enabled-module list (one name per line)
    pub enabled_list_path: PathBuf,

    /// Persisted metadata cache; `None` keeps the cache in memory only
    pub cache_path: Option<PathBuf>,

    /// Module file extension (without the dot)
    pub module_extension: String,

    /// Interpreter used to execute module files
    pub interpreter: String,

    /// Per-module execution timeout
    pub execution_timeout_secs: u64,

    /// Suppress informational output
    pub quiet: bool,

    /// Verbose tracing
    pub debug: bool,

    /// Verify detached signatures when present
    pub verify_signatures: bool,

    /// Reject modules without a signature (requires `verify_signatures`)
    pub require_signatures: bool,

    /// Run the static risk-pattern scan
    pub check_content: bool,

    /// Bypass security rejection and re-run already loaded modules
    pub force: bool,

    /// Let modules with dependencies outside the catalog load anyway
    pub ignore_missing_dependencies: bool,

    /// Maximum modules executing at once within a wave
    pub max_concurrency: usize,

    /// What a batch load covers
    pub load_scope: LoadScope,

    /// Explicit HMAC key; machine-derived when unset
    #[serde(skip_serializing)]
    pub signing_key: Option<String>,

    /// Exact file mode module files must have
    pub required_mode: u32,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        let base = default_base_dir();
        Self {
            modules_dir: base.join("modules.d"),
            enabled_list_path: base.join("enabled"),
            cache_path: Some(base.join("cache").join("metadata.json")),
            module_extension: DEFAULT_MODULE_EXTENSION.to_string(),
            interpreter: "/bin/sh".to_string(),
            execution_timeout_secs: 30,
            quiet: false,
            debug: false,
            verify_signatures: false,
            require_signatures: false,
            check_content: true,
            force: false,
            ignore_missing_dependencies: false,
            max_concurrency: 4,
            load_scope: LoadScope::Catalog,
            signing_key: None,
            required_mode: OWNER_READ_WRITE,
            logging: LoggingConfig::default(),
        }
    }
}

fn default_base_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".modgate")
}

impl LoaderConfig {
    /// Configuration rooted at `base`, with the usual file names beneath it
    pub fn rooted_at<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        Self {
            modules_dir: base.join("modules.d"),
            enabled_list_path: base.join("enabled"),
            cache_path: Some(base.join("cache").join("metadata.json")),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LoaderConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_toml_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay `MODGATE_*` environment toggles
    pub fn apply_env(&mut self) {
        let var = |name: &str| format!("{}{}", ENV_PREFIX, name);

        if let Some(v) = env_flag(&var("QUIET")) {
            self.quiet = v;
        }
        if let Some(v) = env_flag(&var("DEBUG")) {
            self.debug = v;
        }
        if let Some(v) = env_flag(&var("VERIFY_SIGNATURES")) {
            self.verify_signatures = v;
        }
        if let Some(v) = env_flag(&var("REQUIRE_SIGNATURES")) {
            self.require_signatures = v;
        }
        if let Some(v) = env_flag(&var("CHECK_CONTENT")) {
            self.check_content = v;
        }
        if let Some(v) = env_flag(&var("FORCE")) {
            self.force = v;
        }
        if let Some(v) = env_flag(&var("IGNORE_MISSING")) {
            self.ignore_missing_dependencies = v;
        }
        if let Some(v) = env_int::<usize>(&var("MAX_CONCURRENCY")) {
            self.max_concurrency = v;
        }
        if let Some(v) = env_opt(&var("MODULES_DIR")) {
            self.modules_dir = PathBuf::from(v);
        }
        if let Some(v) = env_opt(&var("ENABLED_LIST")) {
            self.enabled_list_path = PathBuf::from(v);
        }
        if let Some(v) = env_opt(&var("HMAC_KEY")) {
            self.signing_key = Some(v);
        }
    }

    /// Defaults, then the optional TOML file, then the environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be at least 1");
        }
        if self.execution_timeout_secs == 0 {
            anyhow::bail!("execution_timeout_secs must be greater than 0");
        }
        if self.require_signatures && !self.verify_signatures {
            anyhow::bail!("require_signatures needs verify_signatures enabled");
        }
        if self.required_mode & 0o077 != 0 {
            anyhow::bail!(
                "required_mode {:o} grants group/other access; module files must be owner-only",
                self.required_mode
            );
        }
        if self.module_extension.is_empty() || self.module_extension.contains('/') {
            anyhow::bail!("invalid module_extension {:?}", self.module_extension);
        }
        Ok(())
    }

    /// Log filter implied by quiet/debug when no explicit filter is set
    pub fn log_filter(&self) -> Option<String> {
        if let Some(filter) = &self.logging.filter {
            return Some(filter.clone());
        }
        if self.debug {
            Some("debug".to_string())
        } else if self.quiet {
            Some("warn".to_string())
        } else {
            None
        }
    }
}
