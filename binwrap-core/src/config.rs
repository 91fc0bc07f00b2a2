//! JSON wrapper definition files.
//!
//! A definition file describes one wrapped binary:
//!
//! ```json
//! {
//!   "exec": "tool",
//!   "dest": "vendor/tool",
//!   "strip": 1,
//!   "timeout_secs": 30,
//!   "args": ["--quiet"],
//!   "sources": [
//!     { "url": "https://example.com/tool-linux-x64.tar.gz", "os": "linux", "arch": "x64" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::source::SourceSet;
use crate::wrapper::BinWrapperBuilder;
use crate::BinWrapper;

/// Errors loading a definition file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid wrapper definition: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Wrapper definition has an empty \"exec\" field")]
    MissingExec,
}

/// Serialized form of a wrapper definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperFile {
    /// Executable name relative to `dest`.
    pub exec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
    #[serde(default)]
    pub auto_exe: bool,
    #[serde(default)]
    pub skip_download: bool,
    #[serde(default)]
    pub strip: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Replaces the child environment when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub sources: SourceSet,
}

impl WrapperFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: Self = serde_json::from_str(json)?;
        if file.exec.trim().is_empty() {
            return Err(ConfigError::MissingExec);
        }
        Ok(file)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Turns the definition into a wrapper builder.
    pub fn into_builder(self) -> BinWrapperBuilder {
        let timeout = self.timeout();

        let mut builder = BinWrapper::builder()
            .exec_path(self.exec)
            .auto_exe(self.auto_exe)
            .skip_download(self.skip_download)
            .strip(self.strip)
            .debug(self.debug)
            .sources(self.sources.iter().cloned())
            .args(self.args);

        if let Some(dest) = self.dest {
            builder = builder.dest(dest);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(env) = self.env {
            builder = builder.env(env);
        }

        builder
    }
}
