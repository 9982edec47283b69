//! In-order descriptor execution.
//!
//! Plays the part of a host build system for descriptors produced by
//! `InstallPipelineBuilder::build`: each runs once, strictly in list order,
//! with exactly the environment it declares.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vcpkg_prebuild_core::{Error, ProcessInvocation, Result};

use crate::lock::WorkspaceLock;
use crate::process::{StepLimits, run_captured};

/// Result of one executed descriptor.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Descriptor label
    pub label: String,
    /// Wall-clock time the process ran
    pub duration: Duration,
    /// Captured standard output
    pub stdout: String,
}

/// Runs descriptors one after another, stopping at the first failure.
#[derive(Debug, Clone)]
pub struct SequentialRunner {
    limits: StepLimits,
    lock_file: Option<PathBuf>,
}

impl SequentialRunner {
    /// Runner giving each descriptor `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            limits: StepLimits::new(timeout),
            lock_file: None,
        }
    }

    /// Hold an exclusive lock on `path` while running.
    #[must_use]
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    /// Abort the running descriptor when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.limits = self.limits.with_cancel(cancel);
        self
    }

    /// Execute `descriptors` in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProcessFailed`] for the first descriptor exiting
    /// non-zero, or [`Error::Timeout`] / [`Error::Cancelled`]. Later
    /// descriptors do not run.
    pub async fn run(&self, descriptors: &[ProcessInvocation]) -> Result<Vec<StepOutcome>> {
        let _lock = match &self.lock_file {
            Some(path) => Some(WorkspaceLock::acquire(path).await?),
            None => None,
        };

        let mut outcomes = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            outcomes.push(self.run_one(descriptor).await?);
        }
        info!(count = outcomes.len(), "Pipeline finished");
        Ok(outcomes)
    }

    async fn run_one(&self, descriptor: &ProcessInvocation) -> Result<StepOutcome> {
        fs::create_dir_all(&descriptor.output_dir)
            .await
            .map_err(|e| Error::io(e, Some(descriptor.output_dir.clone()), "create_dir_all"))?;

        info!(label = %descriptor.label, "Running");
        let started = Instant::now();
        let output = run_captured(
            &descriptor.label,
            &descriptor.executable,
            &descriptor.arguments,
            Some(&descriptor.environment),
            &self.limits,
        )
        .await?;

        if !output.stderr.is_empty() {
            debug!(label = %descriptor.label, stderr = %output.stderr.trim_end(), "Process stderr");
        }
        if !output.status.success() {
            warn!(label = %descriptor.label, status = %output.status, "Step failed");
            return Err(Error::process_failed(
                &descriptor.label,
                format!("exited with {}: {}", output.status, output.stderr.trim()),
            ));
        }
        debug!(label = %descriptor.label, stdout = %output.stdout.trim_end(), "Process stdout");

        Ok(StepOutcome {
            label: descriptor.label.clone(),
            duration: started.elapsed(),
            stdout: output.stdout,
        })
    }
}
