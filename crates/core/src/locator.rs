//! Helper executable lookup.
//!
//! The host build system may expose an allow-list of tools; those win. When
//! the host has no answer a fixed, ordered list of system directories is
//! probed. Absence of a system tool is not transient, so nothing is retried.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::{Error, Result};

/// Host-provided tool resolution.
pub trait ToolResolver: Send + Sync {
    /// Path of the tool called `name`, if the host knows it.
    fn resolve(&self, name: &str) -> Option<PathBuf>;
}

/// Resolver for hosts that expose no tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl ToolResolver for NoResolver {
    fn resolve(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}

/// Resolver backed by a fixed name to path table.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    tools: HashMap<String, PathBuf>,
}

impl MapResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool.
    #[must_use]
    pub fn with_tool(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.tools.insert(name.into(), path.into());
        self
    }
}

impl ToolResolver for MapResolver {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.tools.get(name).cloned()
    }
}

/// Resolver that searches the `PATH` of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl ToolResolver for PathResolver {
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

/// Locates helper executables such as `curl`, `unzip` and `chmod`.
pub struct ToolLocator<'a> {
    resolver: &'a dyn ToolResolver,
    search_dirs: Vec<PathBuf>,
}

impl<'a> ToolLocator<'a> {
    /// Locator consulting `resolver` first and then `search_dirs` in order.
    #[must_use]
    pub fn new(resolver: &'a dyn ToolResolver, search_dirs: Vec<PathBuf>) -> Self {
        Self {
            resolver,
            search_dirs,
        }
    }

    /// Find the executable called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] if neither the host nor any search
    /// directory provides it.
    pub fn locate(&self, name: &str) -> Result<PathBuf> {
        if let Some(path) = self.resolver.resolve(name) {
            debug!(tool = %name, path = %path.display(), "Resolved tool from host");
            return Ok(path);
        }

        for dir in &self.search_dirs {
            let candidate = dir.join(name);
            trace!(candidate = %candidate.display(), "Probing for tool");
            if is_executable(&candidate) {
                debug!(tool = %name, path = %candidate.display(), "Found tool in system directory");
                return Ok(candidate);
            }
        }

        Err(Error::tool_not_found(name, self.search_dirs.clone()))
    }
}

impl fmt::Debug for ToolLocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolLocator")
            .field("search_dirs", &self.search_dirs)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
