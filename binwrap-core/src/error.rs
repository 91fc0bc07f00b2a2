//! Error types for acquisition and execution.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use crate::platform::Platform;

/// Errors produced while resolving, acquiring or running a wrapped binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// No configured source matches the platform.
    #[error("No binary found matching {platform}; it's probably not supported")]
    PlatformUnsupported { platform: Platform },

    /// Source URL could not be used for a download.
    #[error("Invalid download URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Transport-level download failure.
    #[error("Failed to download {url}: {source}")]
    DownloadFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status.
    #[error("Download of {url} failed with status {status}")]
    DownloadStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Archive could not be unpacked.
    #[error("Failed to extract {}: {source}", archive.display())]
    ExtractionFailed {
        archive: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Downloaded file is not an archive format we can unpack.
    #[error("{} is not an archive or has an unsupported archive format", path.display())]
    UnrecognizedArchive { path: PathBuf },

    /// Flattening wrapper directories failed.
    #[error("Failed to strip directories under {}: {source}", path.display())]
    StripFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Local filesystem failure outside extraction/strip.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Executable missing or not runnable.
    #[error("Failed to spawn {}: {source}", program.display())]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading or writing one of the child's standard streams failed.
    #[error("Failed to read {stream}: {source}")]
    StreamReadFailed {
        stream: &'static str,
        #[source]
        source: io::Error,
    },

    /// The configured timeout elapsed before the process exited.
    #[error("Process exceeded its deadline of {timeout:?}")]
    DeadlineExceeded { timeout: Duration },

    /// The process was terminated through a kill request.
    #[error("Process was killed")]
    Killed,

    /// Waiting for the process failed.
    #[error("Failed to wait for process: {source}")]
    Wait {
        #[source]
        source: io::Error,
    },

    /// The process exited unsuccessfully. Captured output is still available.
    #[error("Process exited with {status}")]
    ProcessExit { status: ExitStatus },
}

impl BinError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for [`BinError::DeadlineExceeded`].
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    /// Returns the exit code for [`BinError::ProcessExit`], if the process
    /// exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ProcessExit { status } => status.code(),
            _ => None,
        }
    }
}

/// Result type for binwrap operations.
pub type Result<T> = std::result::Result<T, BinError>;
