//! Platform identification.
//!
//! A [`Platform`] is a plain (OS, architecture) pair using Rust target
//! identifiers (`linux`, `macos`, `windows`, `x86_64`, `aarch64`, ...).
//! Selection code takes it as a parameter, so every platform branch can be
//! exercised from any host.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier used by Rust for Windows targets.
pub const OS_WINDOWS: &str = "windows";

/// Identifier used by Rust for macOS targets.
pub const OS_MACOS: &str = "macos";

// ============================================================================
// Platform
// ============================================================================

/// Operating system and CPU architecture of the machine a binary targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Detects the platform this process is running on.
    pub fn detect() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn is_windows(&self) -> bool {
        self.os == OS_WINDOWS
    }

    /// Names under which artifacts for this OS are commonly published.
    ///
    /// Windows also answers to `win32`, macOS to `darwin`.
    pub fn os_candidates(&self) -> Vec<&str> {
        let mut names = vec![self.os.as_str()];
        match self.os.as_str() {
            OS_WINDOWS => names.push("win32"),
            OS_MACOS => names.push("darwin"),
            _ => {}
        }
        names
    }

    /// Names under which artifacts for this architecture are commonly published.
    ///
    /// 32-bit x86 also answers to `x86`/`386`, x86-64 to `x64`/`amd64`,
    /// aarch64 to `arm64`.
    pub fn arch_candidates(&self) -> Vec<&str> {
        let mut names = vec![self.arch.as_str()];
        let aliases: &[&'static str] = match self.arch.as_str() {
            "x86" | "i386" | "i686" | "386" => &["x86", "386"],
            "x86_64" | "amd64" => &["x64", "amd64"],
            "aarch64" => &["arm64"],
            _ => &[],
        };
        for &alias in aliases {
            if !names.contains(&alias) {
                names.push(alias);
            }
        }
        names
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::detect()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}
