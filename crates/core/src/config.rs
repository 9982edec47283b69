//! Bootstrap configuration.
//!
//! Loaded from `vcpkg-prebuild.toml` next to the manifest; every field is
//! optional and falls back to [`BootstrapConfig::default`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::platform::{Platform, Triplet};
use crate::{Error, Result};

/// File name looked up in the manifest root.
pub const CONFIG_FILE_NAME: &str = "vcpkg-prebuild.toml";

/// Registry release used when none is configured.
pub const DEFAULT_REGISTRY_TAG: &str = "2025.04.09";

/// vcpkg-tool release used when none is configured.
pub const DEFAULT_TOOL_TAG: &str = "2025-04-16";

const DEFAULT_REGISTRY_URL: &str = "https://github.com/microsoft/vcpkg/archive/refs/tags/{tag}.zip";
const DEFAULT_TOOL_URL: &str =
    "https://github.com/microsoft/vcpkg-tool/releases/download/{tag}/{asset}";

/// Default per-step allowance for downloads and external processes.
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 1800;

/// Configuration for one pipeline build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Registry release tag
    pub registry_tag: String,
    /// vcpkg-tool release tag
    pub tool_tag: String,
    /// Target triplet; `None` lets vcpkg pick the host default
    pub triplet: Option<Triplet>,
    /// Where to fetch artifacts from
    pub sources: Sources,
    /// Directories probed for helper tools, in order
    pub search_dirs: Vec<PathBuf>,
    /// Allowance for each eager step
    pub step_timeout_secs: u64,
    /// Use a `vcpkg` binary the host resolves instead of bootstrapping one
    pub use_host_tool: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            registry_tag: DEFAULT_REGISTRY_TAG.to_string(),
            tool_tag: DEFAULT_TOOL_TAG.to_string(),
            triplet: None,
            sources: Sources::default(),
            search_dirs: default_search_dirs(),
            step_timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
            use_host_tool: false,
        }
    }
}

impl BootstrapConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed TOML or invalid values.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| Error::configuration(format!("Failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::io(e, Some(path.to_path_buf()), "read configuration"))?;
        debug!(path = %path.display(), "Loaded configuration");
        Self::from_toml(&contents)
    }

    /// Load the configuration file that sits in `manifest_root`.
    ///
    /// # Errors
    ///
    /// See [`BootstrapConfig::load`].
    pub fn load_from_manifest_root(manifest_root: &Path) -> Result<Self> {
        Self::load(&manifest_root.join(CONFIG_FILE_NAME))
    }

    /// Check that tags can be used as path components.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        validate_tag("registry_tag", &self.registry_tag)?;
        validate_tag("tool_tag", &self.tool_tag)?;
        if self.step_timeout_secs == 0 {
            return Err(Error::configuration("step_timeout_secs must be positive"));
        }
        Ok(())
    }
}

fn validate_tag(field: &str, tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(Error::configuration(format!("{field} must not be empty")));
    }
    if tag.contains(['/', '\\']) || tag == "." || tag == ".." {
        return Err(Error::configuration(format!(
            "{field} '{tag}' must not contain path separators"
        )));
    }
    Ok(())
}

/// Remote locations of the registry archive and the tool binary.
///
/// `{tag}` is replaced with the release tag and `{asset}` with the platform
/// specific tool asset name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sources {
    /// URL template of the registry archive
    pub registry_url: String,
    /// URL template of the tool binary
    pub tool_url: String,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            tool_url: DEFAULT_TOOL_URL.to_string(),
        }
    }
}

impl Sources {
    /// Registry archive URL for a tag.
    #[must_use]
    pub fn registry_url(&self, tag: &str) -> String {
        self.registry_url.replace("{tag}", tag)
    }

    /// Tool binary URL for a tag on a platform.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPlatform`] if no binary is published for it.
    pub fn tool_url(&self, tag: &str, platform: Platform) -> Result<String> {
        let asset = platform.tool_asset()?;
        Ok(self.tool_url.replace("{tag}", tag).replace("{asset}", asset))
    }
}

/// Conventional locations of system binaries, probed in order.
#[must_use]
pub fn default_search_dirs() -> Vec<PathBuf> {
    [
        "/usr/bin",
        "/bin",
        "/usr/sbin",
        "/sbin",
        "/usr/local/bin",
        "/opt/homebrew/bin",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}
