//! Core of vcpkg-prebuild.
//!
//! Plans the steps that bootstrap a vcpkg registry and tool binary into a
//! workspace, then install a manifest's dependencies, and turns those steps
//! into process descriptors a host build system can schedule and cache.
//!
//! # Example
//!
//! ```ignore
//! use vcpkg_prebuild_core::{BootstrapConfig, InstallPipelineBuilder, PackageContext, PathResolver};
//!
//! let context = PackageContext::new("/src/app", "/src/app/.build/vcpkg", PathResolver);
//! let descriptors = InstallPipelineBuilder::from_process_env(BootstrapConfig::default())
//!     .build(&context)?;
//! ```

pub mod config;
pub mod context;
pub mod descriptor;
pub mod emit;
mod error;
pub mod layout;
pub mod locator;
pub mod plan;
pub mod platform;

pub use config::{BootstrapConfig, Sources};
pub use context::{BuildContext, InstallPipelineBuilder, PackageContext, ProjectContext};
pub use descriptor::{Environment, ProcessInvocation};
pub use error::{Error, Result};
pub use layout::ToolchainLayout;
pub use locator::{MapResolver, NoResolver, PathResolver, ToolLocator, ToolResolver};
pub use plan::{FileMode, InstallStep, PipelineRequest, Step, StepKind};
pub use platform::{Arch, Os, Platform, Triplet};
