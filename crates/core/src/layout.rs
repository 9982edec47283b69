//! Deterministic on-disk layout of a bootstrapped toolchain.

use std::path::{Path, PathBuf};

/// File name of the toolchain binary inside the registry root.
pub const TOOL_BINARY_NAME: &str = "vcpkg";

/// Log written next to a downloaded file.
pub const DOWNLOAD_LOG: &str = "download.log";

/// Log written into an extraction directory.
pub const EXTRACT_LOG: &str = "extract.log";

/// Variable that would otherwise point vcpkg at an implicit registry root.
pub const REGISTRY_ROOT_ENV: &str = "VCPKG_ROOT";

/// Paths derived from a workspace and a registry tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainLayout {
    workspace: PathBuf,
    registry_tag: String,
}

impl ToolchainLayout {
    /// Layout for `registry_tag` below `workspace`.
    #[must_use]
    pub fn new(workspace: impl Into<PathBuf>, registry_tag: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            registry_tag: registry_tag.into(),
        }
    }

    /// Workspace root.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Name of the extracted registry folder, `vcpkg-<tag>`.
    #[must_use]
    pub fn registry_folder_name(&self) -> String {
        format!("vcpkg-{}", self.registry_tag)
    }

    /// Extracted registry root.
    #[must_use]
    pub fn registry_root(&self) -> PathBuf {
        self.workspace.join(self.registry_folder_name())
    }

    /// Downloaded registry archive.
    #[must_use]
    pub fn archive(&self) -> PathBuf {
        self.workspace.join(format!("{}.zip", self.registry_folder_name()))
    }

    /// Toolchain binary inside the registry root.
    #[must_use]
    pub fn tool_binary(&self) -> PathBuf {
        self.registry_root().join(TOOL_BINARY_NAME)
    }

    /// Scratch directory declared by the version probe.
    #[must_use]
    pub fn probe_dir(&self) -> PathBuf {
        self.workspace.join("probe")
    }

    /// Lock file guarding the workspace against concurrent runs.
    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.workspace.join(".vcpkg-prebuild.lock")
    }

    /// Leftovers of earlier runs that no later step reads: the registry
    /// archive, interrupted downloads, step logs and the probe directory.
    ///
    /// The registry root and the tool binary are cache entries and are not
    /// listed.
    #[must_use]
    pub fn stale_files(&self) -> Vec<PathBuf> {
        let registry_root = self.registry_root();
        vec![
            self.archive(),
            partial_path(&self.archive()),
            partial_path(&self.tool_binary()),
            self.workspace.join(DOWNLOAD_LOG),
            self.workspace.join(EXTRACT_LOG),
            registry_root.join(DOWNLOAD_LOG),
            self.probe_dir(),
        ]
    }
}

/// Where a download into `destination` is written before it completes.
#[must_use]
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    destination.with_file_name(name)
}
