//! Eager bootstrap driver.
//!
//! Runs the same planned steps a host scheduler would, but immediately and
//! in-process. Used by the CLI and by tests that need a real toolchain on
//! disk without a host build system.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vcpkg_prebuild_core::emit::unzip_arguments;
use vcpkg_prebuild_core::layout::EXTRACT_LOG;
use vcpkg_prebuild_core::plan::{ACCEPT_BINARY, ACCEPT_ZIP, plan_bootstrap, plan_clean};
use vcpkg_prebuild_core::{
    BootstrapConfig, Error, FileMode, PipelineRequest, Platform, Result, Step, StepKind,
    ToolchainLayout,
};

use crate::fetch::{Downloader, HttpFetcher};
use crate::lock::WorkspaceLock;
use crate::process::{StepLimits, run_logged};

/// Mode given to the tool binary after an eager download.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Bootstraps a toolchain into one workspace.
#[derive(Debug)]
pub struct StandaloneOrchestrator {
    workspace: PathBuf,
    config: BootstrapConfig,
    platform: Option<Platform>,
    http: HttpFetcher,
    cancel: CancellationToken,
}

impl StandaloneOrchestrator {
    /// Orchestrator for `workspace` using `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid or the HTTP client
    /// cannot be created.
    pub fn new(workspace: impl Into<PathBuf>, config: BootstrapConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            workspace: workspace.into(),
            config,
            platform: None,
            http: HttpFetcher::new()?,
            cancel: CancellationToken::new(),
        })
    }

    /// Fetch the tool binary for `platform` instead of the running host.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Abort running steps when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Workspace this orchestrator owns.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Download and extract the registry at `tag`, even if already present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DownloadFailed`], [`Error::ExtractFailed`] or
    /// [`Error::EntryNotFound`] if the registry root is missing afterwards.
    pub async fn install_upstream(&self, unzip: &Path, tag: &str) -> Result<PathBuf> {
        let downloader = Downloader::Http(self.http.clone());
        self.locked_upstream(&downloader, unzip, tag).await
    }

    /// [`Self::install_upstream`] with the download done by `curl`.
    ///
    /// # Errors
    ///
    /// See [`Self::install_upstream`].
    pub async fn install_upstream_with_curl(
        &self,
        unzip: &Path,
        curl: &Path,
        tag: &str,
    ) -> Result<PathBuf> {
        let downloader = Downloader::Curl(curl.to_path_buf());
        self.locked_upstream(&downloader, unzip, tag).await
    }

    /// Download the tool binary at `tag` into `registry_root` and make it
    /// executable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPlatform`] if no binary is published for
    /// the platform, [`Error::DownloadFailed`] or [`Error::EntryNotFound`].
    pub async fn install_tool(&self, registry_root: &Path, tag: &str) -> Result<PathBuf> {
        let downloader = Downloader::Http(self.http.clone());
        self.locked_tool(&downloader, registry_root, tag).await
    }

    /// [`Self::install_tool`] with the download done by `curl`.
    ///
    /// # Errors
    ///
    /// See [`Self::install_tool`].
    pub async fn install_tool_with_curl(
        &self,
        curl: &Path,
        registry_root: &Path,
        tag: &str,
    ) -> Result<PathBuf> {
        let downloader = Downloader::Curl(curl.to_path_buf());
        self.locked_tool(&downloader, registry_root, tag).await
    }

    /// Bootstrap registry and tool at the configured tags, skipping whatever
    /// is already present. Returns the registry root.
    ///
    /// The tool is left executable.
    ///
    /// # Errors
    ///
    /// Propagates the first failing step; see [`Self::install_upstream`] and
    /// [`Self::install_tool`].
    pub async fn install(&self, unzip: &Path) -> Result<PathBuf> {
        let downloader = Downloader::Http(self.http.clone());
        self.bootstrap(&downloader, unzip).await
    }

    /// [`Self::install`] with downloads done by `curl`.
    ///
    /// # Errors
    ///
    /// See [`Self::install`].
    pub async fn install_with_curl(&self, unzip: &Path, curl: &Path) -> Result<PathBuf> {
        let downloader = Downloader::Curl(curl.to_path_buf());
        self.bootstrap(&downloader, unzip).await
    }

    /// Delete archives, partial downloads, logs and probe output left in the
    /// workspace. The registry root and tool binary stay.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if an existing leftover cannot be removed.
    pub async fn clean(&self) -> Result<()> {
        let _lock = self.lock().await?;
        let layout = ToolchainLayout::new(&self.workspace, &self.config.registry_tag);
        let downloader = Downloader::Http(self.http.clone());
        self.execute(&[plan_clean(&layout)], &downloader, None, &layout.registry_root())
            .await
    }

    async fn bootstrap(&self, downloader: &Downloader, unzip: &Path) -> Result<PathBuf> {
        let _lock = self.lock().await?;
        let request = self.request()?;
        let layout = request.layout();

        let steps = plan_bootstrap(&request)?;
        if steps.is_empty() {
            debug!(registry = %layout.registry_root().display(), "Toolchain already bootstrapped");
        }
        self.execute(&steps, downloader, Some(unzip), &layout.registry_root())
            .await?;

        let registry_root = require_dir(layout.registry_root()).await?;
        let tool = require_file(layout.tool_binary()).await?;
        make_executable(&tool).await?;

        info!(registry = %registry_root.display(), tool = %tool.display(), "Toolchain ready");
        Ok(registry_root)
    }

    async fn locked_upstream(
        &self,
        downloader: &Downloader,
        unzip: &Path,
        tag: &str,
    ) -> Result<PathBuf> {
        let _lock = self.lock().await?;
        let layout = ToolchainLayout::new(&self.workspace, tag);
        let archive = layout.archive();
        let steps = [
            Step::download(
                self.config.sources.registry_url(tag),
                archive.clone(),
                ACCEPT_ZIP,
            ),
            Step::extract(archive, self.workspace.clone()),
        ];
        self.execute(&steps, downloader, Some(unzip), &layout.registry_root())
            .await?;
        require_dir(layout.registry_root()).await
    }

    async fn locked_tool(
        &self,
        downloader: &Downloader,
        registry_root: &Path,
        tag: &str,
    ) -> Result<PathBuf> {
        let _lock = self.lock().await?;
        let platform = self.platform()?;
        let tool = registry_root.join(vcpkg_prebuild_core::layout::TOOL_BINARY_NAME);
        let url = self.config.sources.tool_url(tag, platform)?;

        let steps = [Step::download(url, tool.clone(), ACCEPT_BINARY)];
        self.execute(&steps, downloader, None, registry_root).await?;

        let tool = require_file(tool).await?;
        make_executable(&tool).await?;
        Ok(tool)
    }

    async fn execute(
        &self,
        steps: &[Step],
        downloader: &Downloader,
        unzip: Option<&Path>,
        registry_root: &Path,
    ) -> Result<()> {
        let limits = self.limits();
        for step in steps {
            fs::create_dir_all(&step.output_dir)
                .await
                .map_err(|e| Error::io(e, Some(step.output_dir.clone()), "create_dir_all"))?;

            match &step.kind {
                StepKind::Download {
                    url,
                    destination,
                    accept,
                } => {
                    downloader.fetch(url, destination, accept, &limits).await?;
                }
                StepKind::Extract {
                    archive,
                    destination,
                } => {
                    let unzip = unzip.ok_or_else(|| {
                        Error::tool_not_found(vcpkg_prebuild_core::emit::UNZIP, Vec::new())
                    })?;
                    if let Err(e) = extract(unzip, archive, destination, &limits).await {
                        discard_partial(registry_root).await;
                        return Err(e);
                    }
                    // the archive must unpack to the registry folder
                    require_dir(registry_root.to_path_buf()).await?;
                }
                StepKind::SetMode { path, mode } => match mode {
                    FileMode::Executable => make_executable(path).await?,
                    FileMode::NonExecutable => set_mode(path, 0o644).await?,
                },
                StepKind::Remove { targets } => {
                    for target in targets {
                        remove(target).await?;
                    }
                }
                StepKind::VersionProbe { .. } | StepKind::Install(_) => {
                    return Err(Error::configuration(format!(
                        "'{}' is not a bootstrap step",
                        step.label
                    )));
                }
            }
        }
        Ok(())
    }

    fn request(&self) -> Result<PipelineRequest> {
        Ok(PipelineRequest {
            workspace: self.workspace.clone(),
            manifest_root: self.workspace.clone(),
            install_root: self
                .workspace
                .join(vcpkg_prebuild_core::context::INSTALL_DIR_NAME),
            registry_tag: self.config.registry_tag.clone(),
            tool_tag: self.config.tool_tag.clone(),
            triplet: self.config.triplet.clone(),
            sources: self.config.sources.clone(),
            platform: self.platform()?,
            host_tool: None,
        })
    }

    fn platform(&self) -> Result<Platform> {
        self.platform.map_or_else(Platform::current, Ok)
    }

    fn limits(&self) -> StepLimits {
        StepLimits::new(Duration::from_secs(self.config.step_timeout_secs))
            .with_cancel(self.cancel.clone())
    }

    async fn lock(&self) -> Result<WorkspaceLock> {
        let layout = ToolchainLayout::new(&self.workspace, &self.config.registry_tag);
        WorkspaceLock::acquire(&layout.lock_file()).await
    }
}

/// Unzip `archive` into `destination`, logging to `<destination>/extract.log`.
///
/// # Errors
///
/// Returns [`Error::ExtractFailed`] if unzip exits non-zero.
pub async fn extract(
    unzip: &Path,
    archive: &Path,
    destination: &Path,
    limits: &StepLimits,
) -> Result<()> {
    let log = destination.join(EXTRACT_LOG);
    let label = format!("Extract {}", archive.display());
    let args = unzip_arguments(archive, destination);

    let status = run_logged(&label, unzip, &args, None, &log, limits).await?;
    if !status.success() {
        warn!(archive = %archive.display(), %status, "Extraction failed");
        return Err(Error::extract_failed(
            archive,
            format!("unzip exited with {status}, see {}", log.display()),
        ));
    }
    info!(archive = %archive.display(), destination = %destination.display(), "Extracted");
    Ok(())
}

async fn discard_partial(registry_root: &Path) {
    if fs::metadata(registry_root).await.is_ok() {
        debug!(registry = %registry_root.display(), "Removing partial extraction");
        if let Err(e) = fs::remove_dir_all(registry_root).await {
            warn!(registry = %registry_root.display(), error = %e, "Failed to remove partial extraction");
        }
    }
}

async fn remove(target: &Path) -> Result<()> {
    let removed = match fs::symlink_metadata(target).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(target).await,
        Ok(_) => fs::remove_file(target).await,
        Err(_) => return Ok(()),
    };
    removed.map_err(|e| Error::io(e, Some(target.to_path_buf()), "remove"))?;
    debug!(path = %target.display(), "Removed");
    Ok(())
}

async fn require_dir(path: PathBuf) -> Result<PathBuf> {
    match fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() => Ok(path),
        _ => Err(Error::entry_not_found(path)),
    }
}

async fn require_file(path: PathBuf) -> Result<PathBuf> {
    match fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => Ok(path),
        _ => Err(Error::entry_not_found(path)),
    }
}

async fn make_executable(path: &Path) -> Result<()> {
    set_mode(path, EXECUTABLE_MODE).await
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| Error::io(e, Some(path.to_path_buf()), "set_permissions"))
}

#[cfg(not(unix))]
async fn set_mode(path: &Path, _mode: u32) -> Result<()> {
    require_file(path.to_path_buf()).await.map(|_| ())
}
