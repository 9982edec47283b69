use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use vcpkg_prebuild_core::{Error, Result};

use crate::tracing::{LogLevel, TracingConfig, TracingFormat};

/// Default scratch directory, relative to the manifest root.
pub const DEFAULT_WORKSPACE_DIR: &str = ".vcpkg-prebuild";

#[derive(Parser, Debug)]
#[command(name = "vcpkg-prebuild")]
#[command(about = "Bootstrap vcpkg and install manifest dependencies before a build")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,

    #[arg(long, global = true, help = "Output logs in JSON format")]
    pub json: bool,

    #[arg(
        long,
        global = true,
        help = "Tracing filter directive, e.g. vcpkg_prebuild_runner=trace (overrides --level and RUST_LOG)"
    )]
    pub log_filter: Option<String>,
}

impl Cli {
    /// Tracing setup requested on the command line; `--json` wins over
    /// `--log-format`.
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig {
            format: if self.json {
                TracingFormat::Json
            } else {
                self.log_format
            },
            level: self.level.into(),
            filter: self.log_filter.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Print the process descriptors a host would schedule, as JSON")]
    Plan {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    #[command(about = "Build the descriptors and run them in order")]
    Run {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    #[command(about = "Download and extract the registry and tool binary")]
    Install {
        #[command(flatten)]
        pipeline: PipelineArgs,
        #[arg(long, help = "Download with curl instead of the built-in HTTP client")]
        curl: bool,
    },
    #[command(about = "Remove archives, partial downloads and logs left in the workspace")]
    Clean {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    #[command(about = "Print the triplet of the running host")]
    Triplet,
}

/// Options shared by every pipeline command.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    #[arg(
        long,
        short = 'm',
        help = "Directory containing vcpkg.json",
        default_value = "."
    )]
    pub manifest_root: PathBuf,

    #[arg(
        long,
        short = 'w',
        help = "Scratch directory [default: <manifest-root>/.vcpkg-prebuild]"
    )]
    pub workspace: Option<PathBuf>,

    #[arg(long, help = "Configuration file [default: <manifest-root>/vcpkg-prebuild.toml]")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Install next to the manifest, as an IDE project build does")]
    pub project: bool,

    #[arg(long, env = "VCPKG_PREBUILD_REGISTRY_TAG", help = "Registry release tag")]
    pub registry_tag: Option<String>,

    #[arg(long, env = "VCPKG_PREBUILD_TOOL_TAG", help = "vcpkg-tool release tag")]
    pub tool_tag: Option<String>,

    #[arg(long, env = "VCPKG_PREBUILD_TRIPLET", help = "Target triplet")]
    pub triplet: Option<String>,
}

impl PipelineArgs {
    /// Absolute manifest root.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the current directory cannot be read.
    pub fn manifest_dir(&self) -> Result<PathBuf> {
        absolute(&self.manifest_root)
    }

    /// Absolute workspace directory after applying the default.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the current directory cannot be read.
    pub fn workspace_dir(&self) -> Result<PathBuf> {
        match &self.workspace {
            Some(workspace) => absolute(workspace),
            None => Ok(self.manifest_dir()?.join(DEFAULT_WORKSPACE_DIR)),
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| Error::io(e, Some(path.to_path_buf()), "resolve path"))
}

pub fn parse() -> Cli {
    Cli::parse()
}
