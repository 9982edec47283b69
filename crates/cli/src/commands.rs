//! Command implementations.

use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use vcpkg_prebuild_core::config::CONFIG_FILE_NAME;
use vcpkg_prebuild_core::emit::{CURL, UNZIP};
use vcpkg_prebuild_core::{
    BootstrapConfig, BuildContext, InstallPipelineBuilder, PackageContext, PathResolver,
    ProcessInvocation, ProjectContext, ToolLocator, ToolResolver, ToolchainLayout, Triplet,
};
use vcpkg_prebuild_runner::{SequentialRunner, StandaloneOrchestrator};

use crate::cli::PipelineArgs;

/// Configuration file contents with command-line overrides applied.
pub fn load_config(args: &PipelineArgs) -> miette::Result<BootstrapConfig> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => args.manifest_dir()?.join(CONFIG_FILE_NAME),
    };
    let mut config = BootstrapConfig::load(&path)?;

    if let Some(tag) = &args.registry_tag {
        config.registry_tag.clone_from(tag);
    }
    if let Some(tag) = &args.tool_tag {
        config.tool_tag.clone_from(tag);
    }
    if let Some(triplet) = &args.triplet {
        config.triplet = Some(Triplet::new(triplet)?);
    }
    config.validate()?;
    Ok(config)
}

fn context<R: ToolResolver + 'static>(
    args: &PipelineArgs,
    resolver: R,
) -> miette::Result<Box<dyn BuildContext>> {
    let manifest = args.manifest_dir()?;
    let workspace = args.workspace_dir()?;
    Ok(if args.project {
        Box::new(ProjectContext::new(manifest, workspace, resolver))
    } else {
        Box::new(PackageContext::new(manifest, workspace, resolver))
    })
}

/// Descriptors for `args`, resolving helpers through `resolver`.
pub fn descriptors<R: ToolResolver + 'static>(
    args: &PipelineArgs,
    resolver: R,
) -> miette::Result<Vec<ProcessInvocation>> {
    let config = load_config(args)?;
    let context = context(args, resolver)?;
    Ok(InstallPipelineBuilder::from_process_env(config).build(context.as_ref())?)
}

/// `plan`: descriptors as pretty JSON.
#[instrument(skip_all)]
pub fn plan(args: &PipelineArgs) -> miette::Result<String> {
    let descriptors = descriptors(args, PathResolver)?;
    serde_json::to_string_pretty(&descriptors)
        .map_err(|e| miette::miette!("Failed to serialize descriptors: {e}"))
}

/// `run`: build the descriptors and execute them in order.
#[instrument(skip_all)]
pub async fn run(args: &PipelineArgs, cancel: CancellationToken) -> miette::Result<usize> {
    let config = load_config(args)?;
    let timeout = Duration::from_secs(config.step_timeout_secs);
    let descriptors = descriptors(args, PathResolver)?;

    let lock = ToolchainLayout::new(args.workspace_dir()?, &config.registry_tag).lock_file();
    let outcomes = SequentialRunner::new(timeout)
        .with_lock_file(lock)
        .with_cancellation(cancel)
        .run(&descriptors)
        .await?;
    Ok(outcomes.len())
}

/// `install`: eager bootstrap; returns the registry root.
#[instrument(skip_all)]
pub async fn install(
    args: &PipelineArgs,
    use_curl: bool,
    cancel: CancellationToken,
) -> miette::Result<PathBuf> {
    let config = load_config(args)?;
    let locator = ToolLocator::new(&PathResolver, config.search_dirs.clone());
    let unzip = locator.locate(UNZIP)?;
    let curl = if use_curl {
        Some(locator.locate(CURL)?)
    } else {
        None
    };

    let orchestrator =
        StandaloneOrchestrator::new(args.workspace_dir()?, config)?.with_cancellation(cancel);
    let root = match curl {
        Some(curl) => orchestrator.install_with_curl(&unzip, &curl).await?,
        None => orchestrator.install(&unzip).await?,
    };
    info!(registry = %root.display(), "Installed toolchain");
    Ok(root)
}

/// `clean`: remove leftovers of earlier runs from the workspace.
#[instrument(skip_all)]
pub async fn clean(args: &PipelineArgs, cancel: CancellationToken) -> miette::Result<()> {
    let config = load_config(args)?;
    let workspace = args.workspace_dir()?;
    StandaloneOrchestrator::new(&workspace, config)?
        .with_cancellation(cancel)
        .clean()
        .await?;
    info!(workspace = %workspace.display(), "Workspace cleaned");
    Ok(())
}

/// `triplet`: the running host's triplet.
pub fn triplet() -> miette::Result<String> {
    Ok(Triplet::host()?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;
    use vcpkg_prebuild_core::MapResolver;
    use vcpkg_prebuild_core::emit::CHMOD;

    fn args(manifest_root: &Path) -> PipelineArgs {
        PipelineArgs {
            manifest_root: manifest_root.to_path_buf(),
            workspace: None,
            config: None,
            project: false,
            registry_tag: None,
            tool_tag: None,
            triplet: None,
        }
    }

    fn resolver() -> MapResolver {
        MapResolver::new()
            .with_tool(CURL, "/host/curl")
            .with_tool(UNZIP, "/host/unzip")
            .with_tool(CHMOD, "/host/chmod")
    }

    #[test]
    fn test_load_config_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&args(dir.path())).unwrap();
        assert_eq!(config, BootstrapConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "registry_tag = \"2024.12.16\"\ntool_tag = \"2024-12-09\"\n",
        )
        .unwrap();

        let mut a = args(dir.path());
        a.tool_tag = Some("2025-04-16".to_string());
        a.triplet = Some("arm64-osx".to_string());
        let config = load_config(&a).unwrap();

        assert_eq!(config.registry_tag, "2024.12.16");
        assert_eq!(config.tool_tag, "2025-04-16");
        assert_eq!(config.triplet.unwrap().as_str(), "arm64-osx");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut a = args(dir.path());
        a.registry_tag = Some("../escape".to_string());
        assert!(load_config(&a).is_err());

        let mut a = args(dir.path());
        a.triplet = Some("X64 Linux".to_string());
        assert!(load_config(&a).is_err());
    }

    #[test]
    fn test_config_read_from_manifest_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "use_host_tool = true\n").unwrap();
        assert!(load_config(&args(dir.path())).unwrap().use_host_tool);
    }

    #[tokio::test]
    async fn test_clean_empty_workspace() {
        let dir = TempDir::new().unwrap();
        let mut a = args(dir.path());
        a.workspace = Some(dir.path().join("ws"));

        clean(&a, CancellationToken::new()).await.unwrap();
        assert!(dir.path().join("ws/.vcpkg-prebuild.lock").is_file());
    }

    #[test]
    fn test_project_flag_moves_install_root() {
        let dir = TempDir::new().unwrap();
        let mut a = args(dir.path());
        a.project = true;

        let descriptors = descriptors(&a, resolver());
        // host triplet may be unsupported on exotic CI machines
        let Ok(descriptors) = descriptors else {
            return;
        };
        let install = descriptors
            .iter()
            .find(|d| d.label == "Run: vcpkg install")
            .unwrap();
        assert_eq!(install.output_dir, dir.path().join("vcpkg_installed"));
        assert!(install.executable.is_absolute());
        assert!(
            descriptors[0]
                .output_dir
                .starts_with(dir.path().join(".vcpkg-prebuild"))
        );
    }
}
