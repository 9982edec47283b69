//! Host build-system boundary.
//!
//! A host asks for the ordered list of descriptors to run before compiling a
//! target. Package builds and IDE project builds share the pipeline and only
//! differ in where the manifest and install roots come from.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::BootstrapConfig;
use crate::descriptor::{Environment, ProcessInvocation};
use crate::emit::DescriptorEmitter;
use crate::layout::{TOOL_BINARY_NAME, ToolchainLayout};
use crate::locator::{ToolLocator, ToolResolver};
use crate::plan::{PipelineRequest, plan_clean, plan_pipeline};
use crate::platform::Platform;
use crate::Result;

/// Directory name of the install root.
pub const INSTALL_DIR_NAME: &str = "vcpkg_installed";

/// What the host exposes to a prebuild step.
pub trait BuildContext {
    /// Scratch directory owned by this pipeline.
    fn workspace(&self) -> &Path;

    /// Directory containing `vcpkg.json`.
    fn manifest_root(&self) -> PathBuf;

    /// Directory receiving installed dependencies.
    fn install_root(&self) -> PathBuf;

    /// Host tool resolution.
    fn resolver(&self) -> &dyn ToolResolver;
}

/// Context of a plain package build.
pub struct PackageContext<R> {
    package_dir: PathBuf,
    work_dir: PathBuf,
    resolver: R,
}

impl<R: ToolResolver> PackageContext<R> {
    /// `package_dir` holds the manifest, `work_dir` is the plugin's scratch
    /// directory.
    pub fn new(package_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>, resolver: R) -> Self {
        Self {
            package_dir: package_dir.into(),
            work_dir: work_dir.into(),
            resolver,
        }
    }
}

impl<R: ToolResolver> BuildContext for PackageContext<R> {
    fn workspace(&self) -> &Path {
        &self.work_dir
    }

    fn manifest_root(&self) -> PathBuf {
        self.package_dir.clone()
    }

    fn install_root(&self) -> PathBuf {
        self.work_dir.join(INSTALL_DIR_NAME)
    }

    fn resolver(&self) -> &dyn ToolResolver {
        &self.resolver
    }
}

/// Context of an IDE project build; installs next to the project.
pub struct ProjectContext<R> {
    project_dir: PathBuf,
    work_dir: PathBuf,
    resolver: R,
}

impl<R: ToolResolver> ProjectContext<R> {
    /// `project_dir` holds the manifest, `work_dir` is the plugin's scratch
    /// directory.
    pub fn new(project_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>, resolver: R) -> Self {
        Self {
            project_dir: project_dir.into(),
            work_dir: work_dir.into(),
            resolver,
        }
    }
}

impl<R: ToolResolver> BuildContext for ProjectContext<R> {
    fn workspace(&self) -> &Path {
        &self.work_dir
    }

    fn manifest_root(&self) -> PathBuf {
        self.project_dir.clone()
    }

    fn install_root(&self) -> PathBuf {
        self.project_dir.join(INSTALL_DIR_NAME)
    }

    fn resolver(&self) -> &dyn ToolResolver {
        &self.resolver
    }
}

/// Composes configuration, context, planner and emitter.
#[derive(Debug, Clone)]
pub struct InstallPipelineBuilder {
    config: BootstrapConfig,
    environment: Environment,
    platform: Option<Platform>,
}

impl InstallPipelineBuilder {
    /// Builder passing `environment` to every emitted process.
    #[must_use]
    pub fn new(config: BootstrapConfig, environment: Environment) -> Self {
        Self {
            config,
            environment,
            platform: None,
        }
    }

    /// Builder inheriting the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 cannot be described
    /// in a descriptor and are left out.
    #[must_use]
    pub fn from_process_env(config: BootstrapConfig) -> Self {
        let environment = std::env::vars_os()
            .filter_map(|(key, value)| match (key.to_str(), value.to_str()) {
                (Some(key), Some(value)) => Some((key.to_string(), value.to_string())),
                _ => {
                    warn!(
                        variable = %key.to_string_lossy(),
                        "Skipping environment variable that is not valid UTF-8"
                    );
                    None
                }
            })
            .collect();
        Self::new(config, environment)
    }

    /// Pick the tool binary for `platform` instead of the running host.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// The request this builder plans for `context`.
    ///
    /// With `use_host_tool` set, the host resolver is asked for `vcpkg`;
    /// when it has none the tool is bootstrapped as usual.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedPlatform`] if the host cannot be
    /// mapped and no platform was given.
    pub fn request(&self, context: &dyn BuildContext) -> Result<PipelineRequest> {
        let platform = match self.platform {
            Some(platform) => platform,
            None => Platform::current()?,
        };
        let host_tool = if self.config.use_host_tool {
            let found = context.resolver().resolve(TOOL_BINARY_NAME);
            match &found {
                Some(tool) => info!(tool = %tool.display(), "Using vcpkg provided by the host"),
                None => debug!("Host provides no vcpkg, bootstrapping one"),
            }
            found
        } else {
            None
        };
        Ok(PipelineRequest {
            workspace: context.workspace().to_path_buf(),
            manifest_root: context.manifest_root(),
            install_root: context.install_root(),
            registry_tag: self.config.registry_tag.clone(),
            tool_tag: self.config.tool_tag.clone(),
            triplet: self.config.triplet.clone(),
            sources: self.config.sources.clone(),
            platform,
            host_tool,
        })
    }

    /// Ordered descriptors for `context`.
    ///
    /// Nothing is downloaded or executed here; the only filesystem access is
    /// checking which artifacts already exist.
    ///
    /// # Errors
    ///
    /// Fails before producing any descriptor if the configuration is
    /// invalid, the platform is unsupported or a helper tool is missing.
    pub fn build(&self, context: &dyn BuildContext) -> Result<Vec<ProcessInvocation>> {
        self.config.validate()?;
        let request = self.request(context)?;
        let steps = plan_pipeline(&request)?;

        let locator = ToolLocator::new(context.resolver(), self.config.search_dirs.clone());
        let descriptors = DescriptorEmitter::new(&locator, self.environment.clone()).emit(&steps)?;

        info!(
            workspace = %request.workspace.display(),
            install_root = %request.install_root.display(),
            count = descriptors.len(),
            "Built vcpkg install pipeline"
        );
        Ok(descriptors)
    }

    /// Descriptor deleting the leftovers of earlier runs in the workspace
    /// of `context`: archive, partial downloads, logs and probe output.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid tags, or
    /// [`crate::Error::ToolNotFound`] if `rm` is unavailable.
    pub fn build_clean(&self, context: &dyn BuildContext) -> Result<Vec<ProcessInvocation>> {
        self.config.validate()?;
        let layout = ToolchainLayout::new(context.workspace(), &self.config.registry_tag);
        let locator = ToolLocator::new(context.resolver(), self.config.search_dirs.clone());
        DescriptorEmitter::new(&locator, self.environment.clone()).emit(&[plan_clean(&layout)])
    }
}
