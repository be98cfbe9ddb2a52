//! Security gate
//!
//! Every module passes through the gate before execution. Permission,
//! signature and content checks each fail independently; a forced load
//! records what was bypassed as warnings instead of rejecting.

use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::module::security::content::ContentScanner;
use crate::module::security::permissions::PermissionChecker;
use crate::module::security::signature::{SignatureStatus, SigningKey};
use crate::module::traits::{ModuleDescriptor, ModuleError};

/// Gate verdict for one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Module may execute; warnings list checks bypassed by force
    Accept { warnings: Vec<String> },
    /// Module must not execute
    Reject(ModuleError),
}

impl GateDecision {
    /// Whether the module may execute
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateDecision::Accept { .. })
    }
}

/// Which gate checks run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    pub verify_signatures: bool,
    pub require_signatures: bool,
    pub check_content: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            verify_signatures: false,
            require_signatures: false,
            check_content: true,
        }
    }
}

/// Per-module validation before execution
#[derive(Debug)]
pub struct SecurityGate {
    policy: GatePolicy,
    permissions: PermissionChecker,
    scanner: ContentScanner,
    key: SigningKey,
}

impl SecurityGate {
    /// Create a gate
    pub fn new(policy: GatePolicy, permissions: PermissionChecker, key: SigningKey) -> Self {
        Self {
            policy,
            permissions,
            scanner: ContentScanner::new(),
            key,
        }
    }

    /// Create a gate from loader configuration
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(
            GatePolicy {
                verify_signatures: config.verify_signatures,
                require_signatures: config.require_signatures,
                check_content: config.check_content,
            },
            PermissionChecker::new(config.required_mode),
            SigningKey::from_config(config.signing_key.as_deref()),
        )
    }

    /// Active policy
    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    /// Signing key shared with the `sign` operation
    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    /// Read the module file and run every check
    pub fn inspect(&self, descriptor: &ModuleDescriptor, force: bool) -> GateDecision {
        match std::fs::read(&descriptor.path) {
            Ok(bytes) => self.check(descriptor, &bytes, force),
            Err(e) => GateDecision::Reject(ModuleError::OperationError(format!(
                "Failed to read module {:?}: {}",
                descriptor.path, e
            ))),
        }
    }

    /// Run every check over already-read module bytes
    pub fn check(&self, descriptor: &ModuleDescriptor, bytes: &[u8], force: bool) -> GateDecision {
        let failures = self.failures(descriptor, bytes);

        match failures.first() {
            None => {
                debug!("Module {} passed security gate", descriptor.name);
                GateDecision::Accept {
                    warnings: Vec::new(),
                }
            }
            Some(first) if !force => {
                warn!("Module {} rejected: {}", descriptor.name, first);
                GateDecision::Reject(first.clone())
            }
            Some(_) => {
                let warnings: Vec<String> = failures.iter().map(ToString::to_string).collect();
                info!(
                    "Module {} forced past security gate: {}",
                    descriptor.name,
                    warnings.join("; ")
                );
                GateDecision::Accept { warnings }
            }
        }
    }

    /// Every failed check, in check order
    fn failures(&self, descriptor: &ModuleDescriptor, bytes: &[u8]) -> Vec<ModuleError> {
        let mut failures = Vec::new();

        if let Err(e) = self.permissions.check(descriptor) {
            failures.push(e);
        }

        if let Some(e) = self.check_signature(&descriptor.name, &descriptor.path, bytes) {
            failures.push(e);
        }

        if self.policy.check_content {
            let text = String::from_utf8_lossy(bytes);
            for pattern in self.scanner.scan(&text) {
                failures.push(ModuleError::UnsafePatternRejected {
                    name: descriptor.name.clone(),
                    pattern: pattern.to_string(),
                });
            }
        }

        failures
    }

    fn check_signature(&self, name: &str, path: &Path, bytes: &[u8]) -> Option<ModuleError> {
        match self.signature_status(path, bytes) {
            SignatureStatus::Invalid => Some(ModuleError::SignatureRejected(name.to_string())),
            SignatureStatus::Missing if self.policy.require_signatures => {
                Some(ModuleError::SignatureMissing(name.to_string()))
            }
            _ => None,
        }
    }

    /// Signature status under the active policy
    pub fn signature_status(&self, path: &Path, bytes: &[u8]) -> SignatureStatus {
        if !self.policy.verify_signatures {
            return SignatureStatus::NotChecked;
        }
        self.key.check_file(path, bytes)
    }
}
