//! Host platform identification and vcpkg triplet naming.
//!
//! The host is queried at runtime rather than fixed with `cfg` attributes so
//! that cross-compilation setups can ask for any `(os, arch)` pair.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Platform identifier combining OS and architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system
    pub os: Os,
    /// CPU architecture
    pub arch: Arch,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detect the platform this process is running on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPlatform`] when the host has no mapping.
    pub fn current() -> Result<Self> {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Build a platform from OS and architecture names such as
    /// `("macos", "aarch64")`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPlatform`] if either part is unknown.
    pub fn from_parts(os: &str, arch: &str) -> Result<Self> {
        match (Os::parse(os), Arch::parse(arch)) {
            (Some(os), Some(arch)) => Ok(Self { os, arch }),
            _ => Err(Error::unsupported_platform(os, arch)),
        }
    }

    /// Asset name of the prebuilt vcpkg tool for this platform.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPlatform`] when no prebuilt binary is published.
    pub fn tool_asset(&self) -> Result<&'static str> {
        match (self.os, self.arch) {
            (Os::Osx, Arch::Arm64 | Arch::X64) => Ok("vcpkg-macos"),
            (Os::Linux, Arch::X64) => Ok("vcpkg-glibc"),
            (Os::Linux, Arch::Arm64) => Ok("vcpkg-glibc-arm64"),
            (Os::Windows, Arch::X64) => Ok("vcpkg.exe"),
            (Os::Windows, Arch::Arm64) => Ok("vcpkg-arm64.exe"),
            _ => Err(Error::unsupported_platform(
                self.os.to_string(),
                self.arch.to_string(),
            )),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch, self.os)
    }
}

/// Operating system, named the way vcpkg triplets name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// macOS
    Osx,
    /// iOS
    Ios,
    /// Linux
    Linux,
    /// Windows
    Windows,
}

impl Os {
    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "macos" | "osx" | "darwin" => Some(Self::Osx),
            "ios" => Some(Self::Ios),
            "linux" => Some(Self::Linux),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Osx => write!(f, "osx"),
            Self::Ios => write!(f, "ios"),
            Self::Linux => write!(f, "linux"),
            Self::Windows => write!(f, "windows"),
        }
    }
}

/// CPU architecture, named the way vcpkg triplets name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// ARM64 / `AArch64`
    Arm64,
    /// `x86_64` / AMD64
    X64,
    /// 32-bit x86
    X86,
    /// 32-bit ARM
    Arm,
}

impl Arch {
    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" => Some(Self::Arm64),
            "x86_64" | "amd64" | "x64" => Some(Self::X64),
            "x86" | "i686" | "i386" => Some(Self::X86),
            "arm" | "armv7" => Some(Self::Arm),
            _ => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arm64 => write!(f, "arm64"),
            Self::X64 => write!(f, "x64"),
            Self::X86 => write!(f, "x86"),
            Self::Arm => write!(f, "arm"),
        }
    }
}

/// A vcpkg triplet such as `arm64-osx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Triplet(String);

impl Triplet {
    /// Validate and wrap a triplet name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for empty names or characters outside
    /// `[a-z0-9-]`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if valid {
            Ok(Self(name))
        } else {
            Err(Error::configuration(format!("Invalid triplet '{name}'")))
        }
    }

    /// The default triplet for a platform.
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        Self(platform.to_string())
    }

    /// The default triplet for the running host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPlatform`] when the host has no mapping.
    pub fn host() -> Result<Self> {
        Platform::current().map(Self::for_platform)
    }

    /// Triplet name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Triplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Triplet {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Triplet> for String {
    fn from(value: Triplet) -> Self {
        value.0
    }
}
