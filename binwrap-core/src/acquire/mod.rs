//! Acquisition of wrapped binaries.
//!
//! Makes a configured executable available on disk: pick the source for the
//! platform, download it, unpack it and flatten wrapper directories.
//!
//! # Architecture
//!
//! - `downloader`: streaming HTTP download into the destination directory
//! - `extractor`: archive detection and extraction (zip, tar, tar.gz, tar.xz)
//! - `strip`: flattening of nested wrapper directories
//!
//! # Example
//!
//! ```ignore
//! use binwrap_core::{Acquirer, AcquisitionTarget, Platform, Source, SourceSet};
//!
//! let sources: SourceSet = vec![
//!     Source::new("https://example.com/tool-linux.tar.gz").os("linux"),
//! ].into();
//! let target = AcquisitionTarget::new("vendor/tool", "tool").strip(1);
//!
//! let path = Acquirer::new()
//!     .ensure_available(&target, &sources, &Platform::detect())
//!     .await?;
//! ```

pub mod downloader;
pub mod extractor;
pub mod strip;

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{BinError, Result};
use crate::platform::Platform;
use crate::source::{Source, SourceSet};

use downloader::download_file;
use extractor::{extract_archive, make_executable, ArchiveFormat};
use strip::strip_into;

// ============================================================================
// Acquisition Target
// ============================================================================

/// Where a binary lives (or will live) once acquired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionTarget {
    /// Destination directory. Empty means "no directory prefix", leaving the
    /// name to `PATH` lookup at launch; `.` means the current directory.
    pub dest: PathBuf,
    /// Executable name or path relative to `dest`.
    pub exec_name: String,
    /// Append `.exe` to the executable name on Windows.
    pub auto_exe: bool,
    /// Number of wrapper directories to flatten after extraction.
    pub strip_levels: usize,
}

impl AcquisitionTarget {
    pub fn new(dest: impl Into<PathBuf>, exec_name: impl Into<String>) -> Self {
        Self {
            dest: dest.into(),
            exec_name: exec_name.into(),
            ..Self::default()
        }
    }

    pub fn auto_exe(mut self, enabled: bool) -> Self {
        self.auto_exe = enabled;
        self
    }

    pub fn strip(mut self, levels: usize) -> Self {
        self.strip_levels = levels;
        self
    }

    /// Returns the executable path, honoring a source's `exec_path` override.
    pub fn resolve(&self, source: Option<&Source>, platform: &Platform) -> PathBuf {
        let name = source
            .and_then(Source::exec_path_override)
            .unwrap_or(&self.exec_name);

        self.dest.join(exe_file_name(name, self.auto_exe, platform))
    }

    /// Path the executable lands at when this target is acquired.
    ///
    /// Same as [`resolve`](Self::resolve) except that an empty `dest` maps to
    /// the current directory, where downloads go, instead of a `PATH` lookup.
    pub fn acquired_path(&self, source: Option<&Source>, platform: &Platform) -> PathBuf {
        let path = self.resolve(source, platform);
        if self.dest.as_os_str().is_empty() {
            self.work_dir().join(path)
        } else {
            path
        }
    }

    /// Directory downloads and extraction go to.
    fn work_dir(&self) -> PathBuf {
        if self.dest.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            self.dest.clone()
        }
    }
}

/// Appends `.exe` on Windows when `auto_exe` is set and the name lacks it.
pub fn exe_file_name(name: &str, auto_exe: bool, platform: &Platform) -> String {
    if !auto_exe || !platform.is_windows() {
        return name.to_string();
    }

    let has_exe = Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"));

    if has_exe {
        name.to_string()
    } else {
        format!("{name}.exe")
    }
}

// ============================================================================
// Acquirer
// ============================================================================

/// Downloads and unpacks binaries on demand.
#[derive(Debug, Clone, Default)]
pub struct Acquirer {
    client: reqwest::Client,
}

impl Acquirer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured HTTP client (proxies, user agent, timeouts).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Makes sure the target executable exists, acquiring it if needed.
    ///
    /// Returns the effective executable path (see
    /// [`AcquisitionTarget::acquired_path`]). Nothing is fetched when the path
    /// already exists.
    pub async fn ensure_available(
        &self,
        target: &AcquisitionTarget,
        sources: &SourceSet,
        platform: &Platform,
    ) -> Result<PathBuf> {
        let source = sources.select(platform);
        let path = target.acquired_path(source, platform);

        match tokio::fs::metadata(&path).await {
            Ok(_) => {
                debug!("{} already present", path.display());
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(BinError::io(&path, e)),
        }

        let source = source.ok_or_else(|| BinError::PlatformUnsupported {
            platform: platform.clone(),
        })?;

        info!("{} not found. Downloading...", path.display());
        self.acquire(source, target).await?;

        if !path.exists() {
            return Err(BinError::io(
                &path,
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "executable missing after acquisition; check exec path and strip settings",
                ),
            ));
        }
        make_executable(&path).map_err(|e| BinError::io(&path, e))?;

        Ok(path)
    }

    async fn acquire(&self, source: &Source, target: &AcquisitionTarget) -> Result<()> {
        let work_dir = target.work_dir();
        let file = download_file(&self.client, source.url(), &work_dir).await?;
        let strip_levels = target.strip_levels;

        let archive = file.clone();
        tokio::task::spawn_blocking(move || unpack(&file, &work_dir, strip_levels))
            .await
            .map_err(|e| BinError::ExtractionFailed {
                archive,
                source: io::Error::other(e),
            })?
    }
}

/// Unpacks a downloaded file into `dest`, then removes the download.
///
/// Files that are not a recognized archive are kept as a bare binary when no
/// stripping is requested.
fn unpack(file: &Path, dest: &Path, strip_levels: usize) -> Result<()> {
    let format = match ArchiveFormat::detect(file) {
        Ok(format) => format,
        Err(source) => {
            remove_download(file);
            return Err(BinError::ExtractionFailed {
                archive: file.to_path_buf(),
                source,
            });
        }
    };

    let Some(format) = format else {
        if strip_levels == 0 {
            info!(
                "{} is not an archive; keeping it as a bare binary",
                file.display()
            );
            return make_executable(file).map_err(|e| BinError::io(file, e));
        }
        remove_download(file);
        return Err(BinError::UnrecognizedArchive {
            path: file.to_path_buf(),
        });
    };

    let extraction_failed = |source| BinError::ExtractionFailed {
        archive: file.to_path_buf(),
        source,
    };

    if strip_levels == 0 {
        let extracted = extract_archive(file, dest, format).map_err(extraction_failed);
        remove_download(file);
        return extracted;
    }

    // Removed on drop, so a failed strip leaves nothing behind for a retry.
    let staging = tempfile::Builder::new()
        .prefix(".binwrap-staging-")
        .tempdir_in(dest)
        .map_err(|e| BinError::io(dest, e));
    let staging = match staging {
        Ok(staging) => staging,
        Err(e) => {
            remove_download(file);
            return Err(e);
        }
    };

    let extracted = extract_archive(file, staging.path(), format).map_err(extraction_failed);
    remove_download(file);
    extracted?;

    strip_into(staging.path(), dest, strip_levels).map_err(|source| BinError::StripFailed {
        path: dest.to_path_buf(),
        source,
    })
}

fn remove_download(file: &Path) {
    if let Err(e) = std::fs::remove_file(file) {
        warn!("Failed to clean up {}: {}", file.display(), e);
    }
}
