//! Process invocation descriptors handed to the host build system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment passed to an external process.
pub type Environment = BTreeMap<String, String>;

/// One external command for the host to run before compilation.
///
/// The host decides caching from `output_dir`; every file the command writes
/// must live below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInvocation {
    /// Human readable label shown by the host
    pub label: String,
    /// Absolute path of the program to execute
    pub executable: PathBuf,
    /// Arguments, excluding the program itself
    pub arguments: Vec<String>,
    /// Complete environment for the process
    pub environment: Environment,
    /// Directory declared as holding every output of the command
    pub output_dir: PathBuf,
}

impl ProcessInvocation {
    /// Create a descriptor.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        executable: impl Into<PathBuf>,
        arguments: Vec<String>,
        environment: Environment,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            label: label.into(),
            executable: executable.into(),
            arguments,
            environment,
            output_dir: output_dir.into(),
        }
    }

    /// Returns true if `path` falls under the declared output directory.
    #[must_use]
    pub fn declares(&self, path: &Path) -> bool {
        path.starts_with(&self.output_dir)
    }
}

impl fmt::Display for ProcessInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.executable.display())?;
        for arg in &self.arguments {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
