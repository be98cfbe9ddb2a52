//! Module discovery
//!
//! Scans the module catalog directory and builds descriptors for every
//! module file without executing any of them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::module::registry::cache::MetadataCache;
use crate::module::traits::{signature_path_for, ModuleDescriptor, ModuleError};
use crate::module::validation::is_valid_name;

/// Default module file extension
pub const DEFAULT_MODULE_EXTENSION: &str = "module";

/// Module discovery scanner
pub struct ModuleDiscovery {
    /// Catalog root
    modules_dir: PathBuf,
    /// Extension that marks a module file (without the dot)
    extension: String,
}

impl ModuleDiscovery {
    /// Create a new module discovery scanner
    pub fn new<P: AsRef<Path>>(modules_dir: P) -> Self {
        Self::with_extension(modules_dir, DEFAULT_MODULE_EXTENSION)
    }

    /// Create a scanner matching a custom file extension
    pub fn with_extension<P: AsRef<Path>>(modules_dir: P, extension: &str) -> Self {
        Self {
            modules_dir: modules_dir.as_ref().to_path_buf(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Catalog root
    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    /// Discover all modules under the catalog root
    ///
    /// A missing root is created and yields an empty catalog. Results are in
    /// discovery order: files before subdirectories, each sorted by name.
    /// When two files share a name, the first one found wins.
    pub fn discover_modules(
        &self,
        cache: &mut MetadataCache,
        recursive: bool,
    ) -> Result<Vec<ModuleDescriptor>, ModuleError> {
        debug!("Discovering modules in {:?}", self.modules_dir);

        if !self.modules_dir.exists() {
            debug!("Modules directory does not exist, creating: {:?}", self.modules_dir);
            fs::create_dir_all(&self.modules_dir).map_err(|e| {
                ModuleError::OperationError(format!("Failed to create modules directory: {}", e))
            })?;
            return Ok(Vec::new());
        }

        let mut modules = Vec::new();
        let mut seen = HashSet::new();
        self.scan_dir(&self.modules_dir, cache, recursive, &mut seen, &mut modules)?;

        info!("Discovered {} modules", modules.len());
        Ok(modules)
    }

    fn scan_dir(
        &self,
        dir: &Path,
        cache: &mut MetadataCache,
        recursive: bool,
        seen: &mut HashSet<String>,
        modules: &mut Vec<ModuleDescriptor>,
    ) -> Result<(), ModuleError> {
        let entries = fs::read_dir(dir).map_err(|e| {
            ModuleError::OperationError(format!("Failed to read modules directory {:?}: {}", dir, e))
        })?;

        let mut files = Vec::new();
        let mut subdirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ModuleError::OperationError(format!("Failed to read directory entry: {}", e))
            })?;
            // Symlinked directories are not followed, so the walk cannot loop
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    warn!("Cannot stat {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            let path = entry.path();
            if file_type.is_dir() {
                subdirs.push(path);
            } else if self.is_module_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        subdirs.sort();

        for path in files {
            match self.describe(&path, cache) {
                Ok(Some(descriptor)) => {
                    if seen.insert(descriptor.name.clone()) {
                        modules.push(descriptor);
                    } else {
                        warn!(
                            "Duplicate module name {} at {:?}, keeping the first",
                            descriptor.name, path
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to read module {:?}: {}", path, e),
            }
        }

        if recursive {
            for subdir in subdirs {
                self.scan_dir(&subdir, cache, recursive, seen, modules)?;
            }
        }
        Ok(())
    }

    fn is_module_file(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str())
            && path.is_file()
    }

    /// Build the descriptor for a single module file
    ///
    /// Returns `Ok(None)` when the file stem is not a valid module name.
    pub fn describe(
        &self,
        path: &Path,
        cache: &mut MetadataCache,
    ) -> Result<Option<ModuleDescriptor>, ModuleError> {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            return Ok(None);
        };
        if !is_valid_name(name) {
            warn!("Ignoring module file with invalid name: {:?}", path);
            return Ok(None);
        }

        let bytes = fs::read(path).map_err(|e| {
            ModuleError::OperationError(format!("Failed to read module file {:?}: {}", path, e))
        })?;
        let (content_hash, metadata) = cache.get_or_parse(path, &bytes);

        Ok(Some(ModuleDescriptor {
            name: name.to_string(),
            path: path.to_path_buf(),
            dependencies: metadata.dependencies,
            permission_mode: permission_mode(path),
            signature_present: signature_path_for(path).is_file(),
            description: metadata.description,
            version: metadata.version,
            content_hash,
        }))
    }
}

/// Permission bits of a file (`None` on platforms without POSIX modes)
pub fn permission_mode(path: &Path) -> Option<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path)
            .ok()
            .map(|m| m.permissions().mode() & 0o7777)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        None
    }
}
