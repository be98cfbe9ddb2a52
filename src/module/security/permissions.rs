//! File permission check for module files
//!
//! A module file must be readable and writable by its owner only. Any group
//! or other bit means another local account could have tampered with it.

use tracing::{debug, warn};

use crate::module::traits::{ModuleDescriptor, ModuleError};

/// Owner read/write, nothing else
pub const OWNER_READ_WRITE: u32 = 0o600;

/// Checks module file modes against a required exact value
#[derive(Debug, Clone, Copy)]
pub struct PermissionChecker {
    required_mode: u32,
}

impl PermissionChecker {
    /// Create a checker requiring `required_mode` exactly
    pub fn new(required_mode: u32) -> Self {
        Self { required_mode }
    }

    /// The mode module files must have
    pub fn required_mode(&self) -> u32 {
        self.required_mode
    }

    /// Check a descriptor's recorded mode
    ///
    /// Platforms without POSIX modes (`permission_mode == None`) pass.
    pub fn check(&self, descriptor: &ModuleDescriptor) -> Result<(), ModuleError> {
        let Some(mode) = descriptor.permission_mode else {
            debug!("No permission bits for {}, skipping mode check", descriptor.name);
            return Ok(());
        };

        let mode = mode & 0o7777;
        if mode != self.required_mode {
            warn!(
                "Module {} has mode {:o}, expected {:o}",
                descriptor.name, mode, self.required_mode
            );
            return Err(ModuleError::PermissionRejected {
                name: descriptor.name.clone(),
                mode,
                expected: self.required_mode,
            });
        }
        Ok(())
    }
}

impl Default for PermissionChecker {
    fn default() -> Self {
        Self::new(OWNER_READ_WRITE)
    }
}

/// Restrict a file to the required mode (used after install and sign)
pub fn restrict_mode(path: &std::path::Path, mode: u32) -> Result<(), ModuleError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            ModuleError::OperationError(format!("Failed to set mode {:o} on {:?}: {}", mode, path, e))
        })
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}
