//! Step planning for the bootstrap-and-install pipeline.
//!
//! Planning is pure apart from existence checks: it decides which artifacts
//! are missing and returns the ordered steps that produce them. Executors
//! (descriptor emission for a host scheduler, or eager execution) consume
//! the same steps, and list order is execution order.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Sources;
use crate::layout::ToolchainLayout;
use crate::platform::{Platform, Triplet};
use crate::Result;

/// MIME type requested for the registry archive.
pub const ACCEPT_ZIP: &str = "application/zip";

/// MIME type requested for the tool binary.
pub const ACCEPT_BINARY: &str = "application/octet-stream";

/// Permission state applied to the toolchain binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Owner, group and others may execute
    Executable,
    /// Nobody may execute
    NonExecutable,
}

/// What a step does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Fetch `url` into `destination`
    Download {
        /// Remote location
        url: String,
        /// File receiving the body
        destination: PathBuf,
        /// MIME type sent in the `Accept` header
        accept: &'static str,
    },
    /// Unpack a zip `archive` into `destination`
    Extract {
        /// Zip file to unpack
        archive: PathBuf,
        /// Directory receiving the archive's top-level folder
        destination: PathBuf,
    },
    /// Change the execute permission of `path`
    SetMode {
        /// File whose mode changes
        path: PathBuf,
        /// Mode to apply
        mode: FileMode,
    },
    /// Run `tool --version`
    VersionProbe {
        /// Toolchain binary
        tool: PathBuf,
    },
    /// Run `tool install ...`
    Install(InstallStep),
    /// Delete `targets` recursively, ignoring missing ones
    Remove {
        /// Files and directories to delete
        targets: Vec<PathBuf>,
    },
}

/// Arguments of the vcpkg install invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    /// Toolchain binary
    pub tool: PathBuf,
    /// Registry passed as `--vcpkg-root`
    pub registry_root: PathBuf,
    /// Directory containing `vcpkg.json`
    pub manifest_root: PathBuf,
    /// Directory receiving installed packages
    pub install_root: PathBuf,
    /// Target triplet, when one is configured
    pub triplet: Option<Triplet>,
}

impl InstallStep {
    /// Command line passed to the tool.
    #[must_use]
    pub fn arguments(&self) -> Vec<String> {
        let mut args = vec![
            "install".to_string(),
            "--no-print-usage".to_string(),
            "--recurse".to_string(),
            // leaves nothing behind that would disturb output caching
            "--clean-after-build".to_string(),
            "--vcpkg-root".to_string(),
            path_arg(&self.registry_root),
            "--x-manifest-root".to_string(),
            path_arg(&self.manifest_root),
            "--x-install-root".to_string(),
            path_arg(&self.install_root),
        ];
        if let Some(triplet) = &self.triplet {
            args.push("--triplet".to_string());
            args.push(triplet.to_string());
        }
        args
    }
}

/// One planned unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Human readable label
    pub label: String,
    /// The work itself
    pub kind: StepKind,
    /// Directory holding every file the step writes
    pub output_dir: PathBuf,
}

impl Step {
    /// Fetch `url` into `destination`.
    #[must_use]
    pub fn download(url: String, destination: PathBuf, accept: &'static str) -> Self {
        let output_dir = parent_or_self(&destination);
        Self {
            label: format!("Download {url}"),
            kind: StepKind::Download {
                url,
                destination,
                accept,
            },
            output_dir,
        }
    }

    /// Unpack `archive` into `destination`.
    #[must_use]
    pub fn extract(archive: PathBuf, destination: PathBuf) -> Self {
        Self {
            label: format!("Extract {}", archive.display()),
            output_dir: destination.clone(),
            kind: StepKind::Extract {
                archive,
                destination,
            },
        }
    }

    /// Toggle the execute permission of `path`.
    #[must_use]
    pub fn set_mode(path: PathBuf, mode: FileMode) -> Self {
        let label = match mode {
            FileMode::Executable => "Enable execute permission",
            FileMode::NonExecutable => "Disable execute permission",
        };
        Self {
            label: label.to_string(),
            output_dir: parent_or_self(&path),
            kind: StepKind::SetMode { path, mode },
        }
    }

    /// Delete `targets`; `output_dir` is the directory they live under.
    #[must_use]
    pub fn remove(targets: Vec<PathBuf>, output_dir: PathBuf) -> Self {
        Self {
            label: format!("Remove {} items", targets.len()),
            kind: StepKind::Remove { targets },
            output_dir,
        }
    }
}

/// Plan the registry download and extraction.
///
/// Returns nothing when `<workspace>/vcpkg-<tag>` already exists; presence is
/// the only cache key, so a damaged earlier extraction is not detected.
#[must_use]
pub fn plan_registry_bootstrap(tag: &str, workspace: &Path, sources: &Sources) -> Vec<Step> {
    let layout = ToolchainLayout::new(workspace, tag);
    let registry_root = layout.registry_root();
    if registry_root.is_dir() {
        debug!(registry = %registry_root.display(), "Registry already present");
        return Vec::new();
    }

    let archive = layout.archive();
    vec![
        Step::download(sources.registry_url(tag), archive.clone(), ACCEPT_ZIP),
        Step::extract(archive, workspace.to_path_buf()),
    ]
}

/// Plan the tool binary download into `registry_root`.
///
/// Returns nothing when `<registry_root>/vcpkg` is already a file.
///
/// # Errors
///
/// Returns [`crate::Error::UnsupportedPlatform`] if no tool binary is
/// published for `platform`.
pub fn plan_tool_bootstrap(
    tag: &str,
    registry_root: &Path,
    sources: &Sources,
    platform: Platform,
) -> Result<Vec<Step>> {
    let tool = registry_root.join(crate::layout::TOOL_BINARY_NAME);
    if tool.is_file() {
        debug!(tool = %tool.display(), "Tool binary already present");
        return Ok(Vec::new());
    }

    let url = sources.tool_url(tag, platform)?;
    Ok(vec![Step::download(url, tool, ACCEPT_BINARY)])
}

/// Everything the full pipeline plan depends on.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Scratch directory holding registry, archive and logs
    pub workspace: PathBuf,
    /// Directory containing `vcpkg.json`
    pub manifest_root: PathBuf,
    /// Directory receiving installed packages
    pub install_root: PathBuf,
    /// Registry release tag
    pub registry_tag: String,
    /// vcpkg-tool release tag
    pub tool_tag: String,
    /// Target triplet, when one is configured
    pub triplet: Option<Triplet>,
    /// Where artifacts are fetched from
    pub sources: Sources,
    /// Platform whose tool binary is fetched
    pub platform: Platform,
    /// Toolchain binary supplied by the host; replaces the tool bootstrap
    pub host_tool: Option<PathBuf>,
}

impl PipelineRequest {
    /// Layout of the toolchain this request bootstraps.
    #[must_use]
    pub fn layout(&self) -> ToolchainLayout {
        ToolchainLayout::new(&self.workspace, &self.registry_tag)
    }
}

/// Plan the bootstrap steps only (registry, then tool).
///
/// # Errors
///
/// See [`plan_tool_bootstrap`].
pub fn plan_bootstrap(request: &PipelineRequest) -> Result<Vec<Step>> {
    let layout = request.layout();
    let mut steps = plan_registry_bootstrap(
        &request.registry_tag,
        &request.workspace,
        &request.sources,
    );
    steps.extend(plan_tool_bootstrap(
        &request.tool_tag,
        &layout.registry_root(),
        &request.sources,
        request.platform,
    )?);
    Ok(steps)
}

/// Plan the whole pipeline in execution order.
///
/// The order is fixed: registry bootstrap, tool bootstrap, enable execute
/// permission, version probe, install, disable execute permission. The final
/// step keeps the binary's mode stable so the host's output fingerprint does
/// not change between runs.
///
/// With a host-supplied tool the tool bootstrap and both permission steps
/// are left out; the registry is still pinned.
///
/// # Errors
///
/// See [`plan_tool_bootstrap`].
pub fn plan_pipeline(request: &PipelineRequest) -> Result<Vec<Step>> {
    let layout = request.layout();

    let steps = if let Some(tool) = &request.host_tool {
        debug!(tool = %tool.display(), "Using host toolchain binary");
        let mut steps = plan_registry_bootstrap(
            &request.registry_tag,
            &request.workspace,
            &request.sources,
        );
        steps.push(version_probe(tool.clone(), &layout));
        steps.push(install(request, tool.clone(), &layout));
        steps
    } else {
        let tool = layout.tool_binary();
        let mut steps = plan_bootstrap(request)?;
        steps.push(Step::set_mode(tool.clone(), FileMode::Executable));
        steps.push(version_probe(tool.clone(), &layout));
        steps.push(install(request, tool.clone(), &layout));
        steps.push(Step::set_mode(tool, FileMode::NonExecutable));
        steps
    };

    debug!(steps = steps.len(), "Planned pipeline");
    Ok(steps)
}

/// Plan removal of the leftovers listed by [`ToolchainLayout::stale_files`].
#[must_use]
pub fn plan_clean(layout: &ToolchainLayout) -> Step {
    Step::remove(layout.stale_files(), layout.workspace().to_path_buf())
}

fn version_probe(tool: PathBuf, layout: &ToolchainLayout) -> Step {
    Step {
        label: "Run: vcpkg version".to_string(),
        kind: StepKind::VersionProbe { tool },
        output_dir: layout.probe_dir(),
    }
}

fn install(request: &PipelineRequest, tool: PathBuf, layout: &ToolchainLayout) -> Step {
    Step {
        label: "Run: vcpkg install".to_string(),
        kind: StepKind::Install(InstallStep {
            tool,
            registry_root: layout.registry_root(),
            manifest_root: request.manifest_root.clone(),
            install_root: request.install_root.clone(),
            triplet: request.triplet.clone(),
        }),
        output_dir: request.install_root.clone(),
    }
}

fn parent_or_self(path: &Path) -> PathBuf {
    path.parent().map_or_else(|| path.to_path_buf(), Path::to_path_buf)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
