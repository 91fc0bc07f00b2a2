//! The [`BinWrapper`] facade: acquisition plus execution behind one type.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::acquire::{Acquirer, AcquisitionTarget};
use crate::error::Result;
use crate::platform::Platform;
use crate::process::{KillSwitch, ProcessRunner, StdinSource, StdoutSink};
use crate::source::{Source, SourceSet};

// ============================================================================
// Configuration
// ============================================================================

/// Location and acquisition settings shared by wrappers of one binary.
#[derive(Debug, Clone, Default)]
pub struct WrapperConfig {
    pub sources: SourceSet,
    pub target: AcquisitionTarget,
    /// Never download; run whatever is at the resolved path.
    pub skip_download: bool,
    pub timeout: Option<Duration>,
    /// Log the executable path and arguments at info level before each run.
    pub debug: bool,
    pub platform: Platform,
    /// Downloader shared by every wrapper built from this configuration.
    pub acquirer: Acquirer,
}

impl WrapperConfig {
    /// Source matching the configured platform, if any.
    pub fn selected_source(&self) -> Option<&Source> {
        self.sources.select(&self.platform)
    }

    /// Whether runs go through acquisition before launching.
    pub fn acquires(&self) -> bool {
        !self.skip_download && !self.sources.is_empty()
    }

    /// Resolved executable path for `platform`.
    ///
    /// With acquisition enabled an empty `dest` resolves to the current
    /// directory, where the download lands; otherwise it is left to `PATH`.
    pub fn path_for(&self, platform: &Platform) -> PathBuf {
        let source = self.sources.select(platform);
        if self.acquires() {
            self.target.acquired_path(source, platform)
        } else {
            self.target.resolve(source, platform)
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`BinWrapper`].
#[derive(Debug, Default)]
pub struct BinWrapperBuilder {
    config: WrapperConfig,
    runner: ProcessRunner,
}

impl BinWrapperBuilder {
    /// Adds a download source.
    pub fn src(mut self, source: Source) -> Self {
        self.config.sources.push(source);
        self
    }

    /// Adds several download sources, keeping their order.
    pub fn sources(mut self, sources: impl IntoIterator<Item = Source>) -> Self {
        for source in sources {
            self.config.sources.push(source);
        }
        self
    }

    /// Directory the binary is downloaded to and run from.
    pub fn dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.config.target.dest = dest.into();
        self
    }

    /// Executable name or path relative to `dest`.
    pub fn exec_path(mut self, name: impl Into<String>) -> Self {
        self.config.target.exec_name = name.into();
        self
    }

    pub fn auto_exe(mut self, enabled: bool) -> Self {
        self.config.target.auto_exe = enabled;
        self
    }

    pub fn skip_download(mut self, skip: bool) -> Self {
        self.config.skip_download = skip;
        self
    }

    /// Number of wrapper directories to flatten after extraction.
    pub fn strip(mut self, levels: usize) -> Self {
        self.config.target.strip_levels = levels;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Overrides the detected platform used for source selection.
    pub fn platform(mut self, platform: Platform) -> Self {
        self.config.platform = platform;
        self
    }

    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.config.acquirer = Acquirer::with_client(client);
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.runner.arg(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner.args(args);
        self
    }

    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.runner.env(vars);
        self
    }

    pub fn stdin(mut self, source: StdinSource) -> Self {
        self.runner.stdin(source);
        self
    }

    pub fn stdout_to(mut self, sink: StdoutSink) -> Self {
        self.runner.stdout_to(sink);
        self
    }

    pub fn build(self) -> BinWrapper {
        let mut runner = self.runner;
        runner.timeout(self.config.timeout);

        BinWrapper {
            config: Arc::new(self.config),
            runner,
        }
    }
}

// ============================================================================
// Wrapper
// ============================================================================

/// Wraps an external command-line tool.
///
/// The binary is downloaded on first use when it is missing from the
/// destination directory, then launched with the configured arguments.
#[derive(Debug)]
pub struct BinWrapper {
    config: Arc<WrapperConfig>,
    runner: ProcessRunner,
}

impl BinWrapper {
    pub fn builder() -> BinWrapperBuilder {
        BinWrapperBuilder::default()
    }

    /// Creates a wrapper sharing `config`, with fresh per-run state.
    pub fn with_config(config: Arc<WrapperConfig>) -> Self {
        let mut runner = ProcessRunner::new();
        runner.timeout(config.timeout);

        Self { config, runner }
    }

    pub fn config(&self) -> &Arc<WrapperConfig> {
        &self.config
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.runner.arg(arg);
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner.args(args);
        self
    }

    pub fn env<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.runner.env(vars);
        self
    }

    pub fn stdin(&mut self, source: StdinSource) -> &mut Self {
        self.runner.stdin(source);
        self
    }

    pub fn stdout_to(&mut self, sink: StdoutSink) -> &mut Self {
        self.runner.stdout_to(sink);
        self
    }

    /// Preset arguments passed before the per-run arguments.
    pub fn preset_args(&self) -> &[String] {
        self.runner.preset_args()
    }

    /// Executable path for the configured platform.
    pub fn path(&self) -> PathBuf {
        self.config.path_for(&self.config.platform)
    }

    pub fn path_for(&self, platform: &Platform) -> PathBuf {
        self.config.path_for(platform)
    }

    pub fn stdout(&self) -> &[u8] {
        self.runner.stdout()
    }

    pub fn stderr(&self) -> &[u8] {
        self.runner.stderr()
    }

    pub fn combined_output(&self) -> Vec<u8> {
        self.runner.combined_output()
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.runner.kill_switch()
    }

    pub fn kill(&self) -> bool {
        self.runner.kill()
    }

    /// Clears arguments, environment, stdio wiring and captured output.
    /// Location settings, sources and the timeout are kept.
    pub fn reset(&mut self) {
        self.runner.reset();
    }

    /// Downloads the binary if needed and returns its path.
    ///
    /// Without sources, or with downloads disabled, the resolved path is
    /// returned as is.
    pub async fn ensure_available(&self) -> Result<PathBuf> {
        if !self.config.acquires() {
            return Ok(self.path());
        }

        self.config
            .acquirer
            .ensure_available(&self.config.target, &self.config.sources, &self.config.platform)
            .await
    }

    /// Runs the binary with the preset arguments followed by `extra_args`.
    pub async fn run(&mut self, extra_args: &[&str]) -> Result<()> {
        let path = self.ensure_available().await?;

        let mut argv: Vec<&str> = self.runner.preset_args().iter().map(String::as_str).collect();
        argv.extend_from_slice(extra_args);
        if self.config.debug {
            info!("{} {:?}", path.display(), argv);
        } else {
            debug!("{} {:?}", path.display(), argv);
        }

        self.runner.run(&path, extra_args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BinError;
    use std::path::Path;

    fn linux() -> Platform {
        Platform::new("linux", "x86_64")
    }

    #[test]
    fn test_path_resolution() {
        let wrapper = BinWrapper::builder()
            .dest("vendor")
            .exec_path("tool")
            .auto_exe(true)
            .platform(linux())
            .build();

        assert_eq!(wrapper.path(), PathBuf::from("vendor/tool"));
        assert_eq!(
            wrapper.path_for(&Platform::new("windows", "x86_64")),
            PathBuf::from("vendor").join("tool.exe")
        );
    }

    #[test]
    fn test_path_uses_platform_exec_override() {
        let wrapper = BinWrapper::builder()
            .src(
                Source::new("https://example.com/win.zip")
                    .os("win32")
                    .exec_path("bin/tool.exe"),
            )
            .src(Source::new("https://example.com/linux.tar.gz").os("linux"))
            .dest("/opt/tool")
            .exec_path("tool")
            .platform(linux())
            .build();

        assert_eq!(wrapper.path(), PathBuf::from("/opt/tool/tool"));
        assert_eq!(
            wrapper.path_for(&Platform::new("windows", "x86_64")),
            PathBuf::from("/opt/tool/bin/tool.exe")
        );
    }

    #[test]
    fn test_with_config_shares_location_not_run_state() {
        let wrapper = BinWrapper::builder()
            .dest("vendor")
            .exec_path("tool")
            .arg("--first")
            .timeout(Duration::from_secs(5))
            .build();

        let sibling = BinWrapper::with_config(Arc::clone(wrapper.config()));

        assert!(Arc::ptr_eq(wrapper.config(), sibling.config()));
        assert_eq!(sibling.path(), wrapper.path());
        assert_eq!(wrapper.preset_args(), ["--first"]);
        assert!(sibling.preset_args().is_empty());
    }

    #[test]
    fn test_empty_dest_with_sources_resolves_to_current_dir() {
        let wrapper = BinWrapper::builder()
            .src(Source::new("https://example.com/tool"))
            .exec_path("tool")
            .build();
        assert_eq!(wrapper.path(), Path::new(".").join("tool"));

        let on_path = BinWrapper::builder()
            .src(Source::new("https://example.com/tool"))
            .exec_path("tool")
            .skip_download(true)
            .build();
        assert_eq!(on_path.path(), PathBuf::from("tool"));
    }

    #[tokio::test]
    async fn test_with_config_keeps_http_client() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/tool")
            .match_header("x-binwrap-client", "custom")
            .with_status(200)
            .with_body("#!/bin/sh\n")
            .create_async()
            .await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "x-binwrap-client",
            reqwest::header::HeaderValue::from_static("custom"),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .unwrap();

        let temp_dir = tempfile::TempDir::new().unwrap();
        let wrapper = BinWrapper::builder()
            .src(Source::new(format!("{}/tool", server.url())))
            .dest(temp_dir.path())
            .exec_path("tool")
            .http_client(client)
            .build();

        let sibling = BinWrapper::with_config(Arc::clone(wrapper.config()));
        let path = sibling.ensure_available().await.unwrap();
        assert_eq!(path, temp_dir.path().join("tool"));
    }

    #[tokio::test]
    async fn test_ensure_available_without_sources() {
        let wrapper = BinWrapper::builder().exec_path("sh").build();
        assert_eq!(wrapper.ensure_available().await.unwrap(), PathBuf::from("sh"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_from_path() {
        let mut wrapper = BinWrapper::builder()
            .exec_path("echo")
            .arg("-n")
            .debug(true)
            .build();

        wrapper.run(&["hello"]).await.unwrap();
        assert_eq!(wrapper.stdout(), b"hello");

        wrapper.reset();
        wrapper.run(&["again"]).await.unwrap();
        assert_eq!(wrapper.stdout(), b"again\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_skip_download_does_not_fetch() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut wrapper = BinWrapper::builder()
            .src(Source::new("http://127.0.0.1:9/tool.tar.gz"))
            .dest(temp_dir.path())
            .exec_path("tool")
            .skip_download(true)
            .build();

        let err = wrapper.run(&[]).await.unwrap_err();
        assert!(matches!(err, BinError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_then_run() {
        let body = {
            let encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let script = b"#!/bin/sh\necho \"wrapped $*\"\n";
            let mut header = tar::Header::new_gnu();
            header.set_path("tool-2.1/tool").unwrap();
            header.set_size(script.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append(&header, &script[..]).unwrap();
            builder.into_inner().unwrap().finish().unwrap()
        };

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/tool-2.1-linux.tar.gz")
            .with_status(200)
            .with_body(body)
            .expect(1)
            .create_async()
            .await;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut wrapper = BinWrapper::builder()
            .src(Source::new(format!("{}/tool-2.1-linux.tar.gz", server.url())).os("linux"))
            .src(Source::new("http://127.0.0.1:9/tool-mac.tar.gz").os("darwin"))
            .dest(temp_dir.path().join("bin"))
            .exec_path("tool")
            .strip(1)
            .arg("--flag")
            .platform(linux())
            .build();

        wrapper.run(&["a"]).await.unwrap();
        assert_eq!(wrapper.stdout(), b"wrapped --flag a\n");

        // Already on disk: no second download.
        wrapper.run(&["b"]).await.unwrap();
        assert_eq!(wrapper.stdout(), b"wrapped --flag b\n");

        mock.assert_async().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_into_current_dir_then_run() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/dl/binwrap-local-tool")
            .with_status(200)
            .with_body("#!/bin/sh\necho local\n")
            .create_async()
            .await;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let previous_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(temp_dir.path()).unwrap();

        let mut wrapper = BinWrapper::builder()
            .src(Source::new(format!("{}/dl/binwrap-local-tool", server.url())))
            .exec_path("binwrap-local-tool")
            .build();
        let outcome = wrapper.run(&[]).await;
        let downloaded = Path::new("binwrap-local-tool").exists();

        std::env::set_current_dir(previous_dir).unwrap();

        outcome.unwrap();
        assert!(downloaded);
        assert_eq!(wrapper.stdout(), b"local\n");
    }
}
