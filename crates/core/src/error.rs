//! Error types for vcpkg-prebuild operations

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for vcpkg-prebuild operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A helper executable could not be found anywhere
    #[error("Required tool '{name}' was not found")]
    #[diagnostic(
        code(vcpkg_prebuild::tool::not_found),
        help("Install the tool or make it available to the build host")
    )]
    ToolNotFound {
        /// Name of the executable that was looked up
        name: String,
        /// Directories probed after the host resolver failed
        searched: Vec<PathBuf>,
    },

    /// A remote artifact could not be downloaded
    #[error("Failed to download {url}: {message}")]
    #[diagnostic(code(vcpkg_prebuild::download::failed))]
    DownloadFailed {
        /// The remote location
        url: String,
        /// What went wrong
        message: String,
    },

    /// An archive could not be extracted
    #[error("Failed to extract {}: {message}", archive.display())]
    #[diagnostic(code(vcpkg_prebuild::extract::failed))]
    ExtractFailed {
        /// The archive being extracted
        archive: PathBuf,
        /// What went wrong
        message: String,
    },

    /// An artifact expected after a step is missing
    #[error("The folder/file doesn't exist: {}", path.display())]
    #[diagnostic(code(vcpkg_prebuild::entry::not_found))]
    EntryNotFound {
        /// The missing path
        path: PathBuf,
    },

    /// Host operating system or architecture has no triplet mapping
    #[error("Unsupported platform: {os}/{arch}")]
    #[diagnostic(
        code(vcpkg_prebuild::platform::unsupported),
        help("vcpkg-tool publishes binaries for macOS, Linux and Windows on x64 and arm64")
    )]
    UnsupportedPlatform {
        /// Operating system name as reported by the host
        os: String,
        /// CPU architecture name as reported by the host
        arch: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    #[diagnostic(code(vcpkg_prebuild::config::invalid))]
    Configuration {
        /// The error message describing the configuration issue
        message: String,
    },

    /// I/O error with path context
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(vcpkg_prebuild::io::error))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// The path where the I/O error occurred, if applicable
        path: Option<Box<Path>>,
        /// Description of the operation that failed
        operation: String,
    },

    /// A step ran longer than its allowance
    #[error("{step} timed out after {seconds} seconds")]
    #[diagnostic(code(vcpkg_prebuild::timeout))]
    Timeout {
        /// Label of the step that timed out
        step: String,
        /// The number of seconds before the timeout occurred
        seconds: u64,
    },

    /// A step was cancelled before it finished
    #[error("{step} was cancelled")]
    #[diagnostic(code(vcpkg_prebuild::cancelled))]
    Cancelled {
        /// Label of the cancelled step
        step: String,
    },

    /// An external process exited unsuccessfully
    #[error("{step} failed: {message}")]
    #[diagnostic(code(vcpkg_prebuild::process))]
    ProcessFailed {
        /// Label of the failing step
        step: String,
        /// Exit status or spawn failure description
        message: String,
    },
}

impl Error {
    /// Create a tool not found error
    #[must_use]
    pub fn tool_not_found(name: impl Into<String>, searched: Vec<PathBuf>) -> Self {
        Self::ToolNotFound {
            name: name.into(),
            searched,
        }
    }

    /// Create a download failure
    #[must_use]
    pub fn download_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an extraction failure
    #[must_use]
    pub fn extract_failed(archive: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ExtractFailed {
            archive: archive.into(),
            message: message.into(),
        }
    }

    /// Create a missing entry error
    #[must_use]
    pub fn entry_not_found(path: impl Into<PathBuf>) -> Self {
        Self::EntryNotFound { path: path.into() }
    }

    /// Create an unsupported platform error
    #[must_use]
    pub fn unsupported_platform(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Create a configuration error with a message
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an I/O error with context
    #[must_use]
    pub fn io(source: std::io::Error, path: Option<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.map(|p| p.into_boxed_path()),
            operation: operation.into(),
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(step: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            step: step.into(),
            seconds,
        }
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled(step: impl Into<String>) -> Self {
        Self::Cancelled { step: step.into() }
    }

    /// Create a process failure
    #[must_use]
    pub fn process_failed(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProcessFailed {
            step: step.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: None,
            operation: "I/O operation".to_string(),
        }
    }
}

/// Result type for vcpkg-prebuild operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_message() {
        let error = Error::tool_not_found("unzip", vec![PathBuf::from("/usr/bin")]);
        assert_eq!(error.to_string(), "Required tool 'unzip' was not found");
    }

    #[test]
    fn test_download_failed_message() {
        let error = Error::download_failed("https://example.com/a.zip", "HTTP 404 Not Found");
        assert_eq!(
            error.to_string(),
            "Failed to download https://example.com/a.zip: HTTP 404 Not Found"
        );
    }

    #[test]
    fn test_entry_not_found_message() {
        let error = Error::entry_not_found("/tmp/ws/vcpkg-2025.04.09");
        assert_eq!(
            error.to_string(),
            "The folder/file doesn't exist: /tmp/ws/vcpkg-2025.04.09"
        );
    }

    #[test]
    fn test_unsupported_platform_message() {
        let error = Error::unsupported_platform("freebsd", "riscv64");
        assert_eq!(error.to_string(), "Unsupported platform: freebsd/riscv64");
    }

    #[test]
    fn test_timeout_message() {
        let error = Error::timeout("Run: unzip", 30);
        assert_eq!(error.to_string(), "Run: unzip timed out after 30 seconds");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::from(io_error);
        assert!(error.to_string().contains("I/O"));
    }

    #[test]
    fn test_diagnostic_codes() {
        let error = Error::extract_failed("/tmp/a.zip", "exit status: 9");
        let code = error.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("vcpkg_prebuild::extract::failed"));
    }
}
