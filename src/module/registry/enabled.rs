//! Enabled-module list
//!
//! Plain text, one module name per line. Blank lines and `#` comments are
//! ignored on read and preserved on rewrite.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::module::traits::ModuleError;

/// Enabled-module list file
#[derive(Debug, Clone)]
pub struct EnabledList {
    path: PathBuf,
}

impl EnabledList {
    /// List stored at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the list
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names on the list in file order; a missing file is an empty list
    pub fn read(&self) -> Result<Vec<String>, ModuleError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ModuleError::OperationError(format!(
                    "Failed to read enabled list {:?}: {}",
                    self.path, e
                )))
            }
        };

        let mut names: Vec<String> = Vec::new();
        for name in content.lines().filter_map(entry_name) {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Whether `name` is on the list
    pub fn contains(&self, name: &str) -> Result<bool, ModuleError> {
        Ok(self.read()?.iter().any(|n| n == name))
    }

    /// Append `name` unless it is already listed
    ///
    /// Returns `true` if the file changed.
    pub fn add(&self, name: &str) -> Result<bool, ModuleError> {
        if self.contains(name)? {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }

        let needs_newline = fs::read(&self.path)
            .map(|bytes| bytes.last().is_some_and(|&b| b != b'\n'))
            .unwrap_or(false);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_error(e))?;
        if needs_newline {
            writeln!(file).map_err(|e| self.write_error(e))?;
        }
        writeln!(file, "{}", name).map_err(|e| self.write_error(e))?;

        debug!("Added {} to enabled list {:?}", name, self.path);
        Ok(true)
    }

    /// Remove every line naming `name`
    ///
    /// Returns `true` if the name was listed.
    pub fn remove(&self, name: &str) -> Result<bool, ModuleError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(self.write_error(e)),
        };

        let kept: Vec<&str> = content
            .lines()
            .filter(|line| entry_name(line) != Some(name))
            .collect();
        if kept.len() == content.lines().count() {
            return Ok(false);
        }

        let mut rewritten = kept.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }
        fs::write(&self.path, rewritten).map_err(|e| self.write_error(e))?;

        debug!("Removed {} from enabled list {:?}", name, self.path);
        Ok(true)
    }

    fn write_error(&self, e: std::io::Error) -> ModuleError {
        ModuleError::OperationError(format!(
            "Failed to update enabled list {:?}: {}",
            self.path, e
        ))
    }
}

fn entry_name(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        None
    } else {
        Some(line)
    }
}
