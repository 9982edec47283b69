//! Eager executors for vcpkg-prebuild.
//!
//! [`StandaloneOrchestrator`] bootstraps a toolchain directly, without a host
//! build system. [`SequentialRunner`] executes the descriptors produced by
//! `vcpkg_prebuild_core::InstallPipelineBuilder` one by one, the way a host
//! scheduler would.

pub mod fetch;
pub mod lock;
pub mod orchestrator;
pub mod process;
pub mod scheduler;

pub use fetch::{Downloader, HttpFetcher};
pub use lock::WorkspaceLock;
pub use orchestrator::StandaloneOrchestrator;
pub use process::{CapturedOutput, StepLimits};
pub use scheduler::{SequentialRunner, StepOutcome};
