//! Conversion of planned steps into host process descriptors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::descriptor::{Environment, ProcessInvocation};
use crate::layout::REGISTRY_ROOT_ENV;
use crate::locator::ToolLocator;
use crate::plan::{FileMode, Step, StepKind};
use crate::Result;

/// Downloader used by emitted descriptors.
pub const CURL: &str = "curl";
/// Archive extractor used by emitted descriptors.
pub const UNZIP: &str = "unzip";
/// Permission setter used by emitted descriptors.
pub const CHMOD: &str = "chmod";
/// File remover used by emitted descriptors.
pub const RM: &str = "rm";

/// Helper program a step needs, if any.
#[must_use]
pub fn helper_for(kind: &StepKind) -> Option<&'static str> {
    match kind {
        StepKind::Download { .. } => Some(CURL),
        StepKind::Extract { .. } => Some(UNZIP),
        StepKind::SetMode { .. } => Some(CHMOD),
        StepKind::Remove { .. } => Some(RM),
        StepKind::VersionProbe { .. } | StepKind::Install(_) => None,
    }
}

/// `curl` arguments fetching `url` into `output`, failing on HTTP errors.
#[must_use]
pub fn curl_arguments(url: &str, output: &Path, accept: &str) -> Vec<String> {
    vec![
        "-L".to_string(),
        "--fail".to_string(),
        "--silent".to_string(),
        "--show-error".to_string(),
        "-H".to_string(),
        format!("Accept: {accept}"),
        url.to_string(),
        "--output".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// `unzip` arguments extracting `archive` into `destination`, overwriting.
#[must_use]
pub fn unzip_arguments(archive: &Path, destination: &Path) -> Vec<String> {
    vec![
        "-o".to_string(),
        archive.to_string_lossy().into_owned(),
        "-d".to_string(),
        destination.to_string_lossy().into_owned(),
    ]
}

/// `rm` arguments deleting `targets` recursively, ignoring missing ones.
#[must_use]
pub fn remove_arguments(targets: &[PathBuf]) -> Vec<String> {
    let mut args = vec!["-f".to_string(), "-R".to_string()];
    args.extend(targets.iter().map(|t| t.to_string_lossy().into_owned()));
    args
}

/// Environment for the install step: `base` without the registry root
/// variable, so `--vcpkg-root` is the only source of truth.
#[must_use]
pub fn install_environment(base: &Environment) -> Environment {
    let mut env = base.clone();
    env.remove(REGISTRY_ROOT_ENV);
    env
}

/// Turns steps into [`ProcessInvocation`]s.
#[derive(Debug)]
pub struct DescriptorEmitter<'a> {
    locator: &'a ToolLocator<'a>,
    environment: Environment,
}

impl<'a> DescriptorEmitter<'a> {
    /// Emitter resolving helpers through `locator` and passing `environment`
    /// to every process.
    #[must_use]
    pub fn new(locator: &'a ToolLocator<'a>, environment: Environment) -> Self {
        Self {
            locator,
            environment,
        }
    }

    /// Convert `steps`, preserving their order.
    ///
    /// Every helper tool is located before anything is converted, so a
    /// missing tool yields an error and no descriptors at all.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ToolNotFound`] if a helper is unavailable.
    pub fn emit(&self, steps: &[Step]) -> Result<Vec<ProcessInvocation>> {
        let mut helpers: HashMap<&'static str, PathBuf> = HashMap::new();
        for step in steps {
            if let Some(name) = helper_for(&step.kind)
                && !helpers.contains_key(name)
            {
                helpers.insert(name, self.locator.locate(name)?);
            }
        }

        let descriptors: Vec<_> = steps
            .iter()
            .map(|step| self.convert(step, &helpers))
            .collect();
        debug!(count = descriptors.len(), "Emitted descriptors");
        Ok(descriptors)
    }

    fn convert(&self, step: &Step, helpers: &HashMap<&'static str, PathBuf>) -> ProcessInvocation {
        let helper = |name: &str| helpers.get(name).cloned().unwrap_or_else(|| PathBuf::from(name));
        let (label, executable, arguments, environment) = match &step.kind {
            StepKind::Download {
                url,
                destination,
                accept,
            } => (
                format!("Run: curl {url}"),
                helper(CURL),
                curl_arguments(url, destination, accept),
                self.environment.clone(),
            ),
            StepKind::Extract {
                archive,
                destination,
            } => (
                format!("Run: unzip {}", archive.display()),
                helper(UNZIP),
                unzip_arguments(archive, destination),
                self.environment.clone(),
            ),
            StepKind::SetMode { path, mode } => {
                let flag = match mode {
                    FileMode::Executable => "+x",
                    FileMode::NonExecutable => "-x",
                };
                (
                    "Run: chmod".to_string(),
                    helper(CHMOD),
                    vec![flag.to_string(), path.to_string_lossy().into_owned()],
                    self.environment.clone(),
                )
            }
            StepKind::VersionProbe { tool } => (
                step.label.clone(),
                tool.clone(),
                vec!["--version".to_string()],
                self.environment.clone(),
            ),
            StepKind::Install(install) => (
                step.label.clone(),
                install.tool.clone(),
                install.arguments(),
                install_environment(&self.environment),
            ),
            StepKind::Remove { targets } => (
                format!("Run: rm {} items", targets.len()),
                helper(RM),
                remove_arguments(targets),
                self.environment.clone(),
            ),
        };

        ProcessInvocation::new(
            label,
            executable,
            arguments,
            environment,
            step.output_dir.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Sources;
    use crate::locator::{MapResolver, NoResolver};
    use crate::plan::{PipelineRequest, plan_pipeline};
    use crate::platform::{Arch, Os, Platform};
    use tempfile::TempDir;

    fn resolver() -> MapResolver {
        MapResolver::new()
            .with_tool(CURL, "/host/curl")
            .with_tool(UNZIP, "/host/unzip")
            .with_tool(CHMOD, "/host/chmod")
    }

    fn request(workspace: &Path) -> PipelineRequest {
        PipelineRequest {
            workspace: workspace.to_path_buf(),
            manifest_root: PathBuf::from("/project"),
            install_root: workspace.join("vcpkg_installed"),
            registry_tag: "2025.04.09".to_string(),
            tool_tag: "2025-04-16".to_string(),
            triplet: None,
            sources: Sources::default(),
            platform: Platform::new(Os::Linux, Arch::X64),
            host_tool: None,
        }
    }

    #[test]
    fn test_helper_command_lines() {
        let ws = TempDir::new().unwrap();
        let resolver = resolver();
        let locator = ToolLocator::new(&resolver, Vec::new());
        let steps = plan_pipeline(&request(ws.path())).unwrap();
        let descriptors = DescriptorEmitter::new(&locator, Environment::new())
            .emit(&steps)
            .unwrap();

        let archive = ws.path().join("vcpkg-2025.04.09.zip");
        assert_eq!(descriptors[0].executable, PathBuf::from("/host/curl"));
        assert_eq!(
            descriptors[0].arguments.last().map(String::as_str),
            Some(archive.to_str().unwrap())
        );
        assert!(
            descriptors[0]
                .arguments
                .contains(&"Accept: application/zip".to_string())
        );

        assert_eq!(descriptors[1].executable, PathBuf::from("/host/unzip"));
        assert_eq!(
            descriptors[1].arguments,
            vec![
                "-o".to_string(),
                archive.to_string_lossy().into_owned(),
                "-d".to_string(),
                ws.path().to_string_lossy().into_owned(),
            ]
        );

        assert_eq!(descriptors[3].executable, PathBuf::from("/host/chmod"));
        assert_eq!(descriptors[3].arguments[0], "+x");
        assert_eq!(descriptors[6].arguments[0], "-x");
    }

    #[test]
    fn test_curl_arguments() {
        let args = curl_arguments(
            "https://example.com/a.zip",
            Path::new("/ws/a.zip"),
            "application/zip",
        );
        assert_eq!(
            args,
            vec![
                "-L",
                "--fail",
                "--silent",
                "--show-error",
                "-H",
                "Accept: application/zip",
                "https://example.com/a.zip",
                "--output",
                "/ws/a.zip",
            ]
        );
    }

    #[test]
    fn test_clean_command_line() {
        let resolver = MapResolver::new().with_tool(RM, "/host/rm");
        let locator = ToolLocator::new(&resolver, Vec::new());
        let layout = crate::layout::ToolchainLayout::new("/ws", "2025.04.09");
        let descriptors = DescriptorEmitter::new(&locator, Environment::new())
            .emit(&[crate::plan::plan_clean(&layout)])
            .unwrap();

        assert_eq!(descriptors.len(), 1);
        let clean = &descriptors[0];
        assert_eq!(clean.executable, PathBuf::from("/host/rm"));
        assert_eq!(clean.label, format!("Run: rm {} items", layout.stale_files().len()));
        assert_eq!(clean.arguments[..3], ["-f", "-R", "/ws/vcpkg-2025.04.09.zip"]);
        assert_eq!(clean.output_dir, PathBuf::from("/ws"));
    }

    #[test]
    fn test_missing_helper_emits_nothing() {
        let ws = TempDir::new().unwrap();
        let empty = TempDir::new().unwrap();
        let locator = ToolLocator::new(&NoResolver, vec![empty.path().to_path_buf()]);
        let steps = plan_pipeline(&request(ws.path())).unwrap();

        let result = DescriptorEmitter::new(&locator, Environment::new()).emit(&steps);
        assert!(matches!(result, Err(crate::Error::ToolNotFound { .. })));
    }

    #[test]
    fn test_install_environment_drops_registry_root() {
        let mut base = Environment::new();
        base.insert("VCPKG_ROOT".into(), "/somewhere/else".into());
        base.insert("HOME".into(), "/home/dev".into());

        let env = install_environment(&base);
        assert!(!env.contains_key("VCPKG_ROOT"));
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/dev"));
    }

    #[test]
    fn test_only_install_step_is_sanitized() {
        let ws = TempDir::new().unwrap();
        let resolver = resolver();
        let locator = ToolLocator::new(&resolver, Vec::new());
        let mut base = Environment::new();
        base.insert("VCPKG_ROOT".into(), "/elsewhere".into());

        let steps = plan_pipeline(&request(ws.path())).unwrap();
        let descriptors = DescriptorEmitter::new(&locator, base).emit(&steps).unwrap();

        for descriptor in &descriptors {
            let sanitized = descriptor.label == "Run: vcpkg install";
            assert_eq!(descriptor.environment.contains_key("VCPKG_ROOT"), !sanitized);
        }
    }
}
