//! Streaming file downloader.
//!
//! Response bodies are written to disk chunk by chunk, so large artifacts
//! never sit in memory as a whole.

use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::error::{BinError, Result};

/// Fallback file name when a URL has no usable last path segment.
const DEFAULT_FILE_NAME: &str = "download";

// ============================================================================
// URL Validation
// ============================================================================

/// Parses `url_str` and checks it can be fetched over HTTP(S).
fn validate_url(url_str: &str) -> Result<Url> {
    let invalid = |reason: String| BinError::InvalidUrl {
        url: url_str.to_string(),
        reason,
    };

    let url = Url::parse(url_str).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }

    if url.host_str().is_none() {
        return Err(invalid("URL must have a host".to_string()));
    }

    Ok(url)
}

/// Derives the local file name from the last segment of the URL path.
pub fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_FILE_NAME)
        .to_string()
}

// ============================================================================
// Download Function
// ============================================================================

/// Downloads `url` into `dest_dir`, naming the file after the URL path.
///
/// The directory is created if needed. Redirects are followed by the client;
/// the final response must be 2xx or 3xx. The file is created with
/// owner-executable permissions because it may itself be the binary.
///
/// Returns the path of the written file.
pub async fn download_file(
    client: &reqwest::Client,
    url_str: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let url = validate_url(url_str)?;

    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|e| BinError::io(dest_dir, e))?;

    let dest = dest_dir.join(file_name_from_url(&url));
    info!("Downloading {} to {}", url_str, dest.display());

    let download_failed = |source| BinError::DownloadFailed {
        url: url_str.to_string(),
        source,
    };

    let response = client.get(url).send().await.map_err(download_failed)?;

    let status = response.status();
    if !(status.is_success() || status.is_redirection()) {
        return Err(BinError::DownloadStatus {
            url: url_str.to_string(),
            status,
        });
    }
    debug!("Content-Length: {:?}", response.content_length());

    let mut file = create_executable_file(&dest).await?;

    let mut stream = response.bytes_stream();
    let mut bytes_downloaded: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(download_failed)?;
        file.write_all(&chunk)
            .await
            .map_err(|e| BinError::io(&dest, e))?;
        bytes_downloaded += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| BinError::io(&dest, e))?;

    info!(
        "Download complete: {} bytes written to {}",
        bytes_downloaded,
        dest.display()
    );

    Ok(dest)
}

async fn create_executable_file(path: &Path) -> Result<File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o755);

    options.open(path).await.map_err(|e| BinError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_url_schemes() {
        assert!(validate_url("https://github.com/file.zip").is_ok());
        assert!(validate_url("http://localhost:8080/file.zip").is_ok());
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(BinError::InvalidUrl { .. })
        ));
        assert!(validate_url("not-a-url").is_err());
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_file_name_from_url() {
        let url = Url::parse("https://example.com/releases/v1/tool-linux.tar.gz?x=1").unwrap();
        assert_eq!(file_name_from_url(&url), "tool-linux.tar.gz");

        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(file_name_from_url(&url), DEFAULT_FILE_NAME);
    }

    #[tokio::test]
    async fn test_download_streams_body_to_disk() {
        let mut server = mockito::Server::new_async().await;
        let body = vec![7u8; 256 * 1024];
        let _mock = server
            .mock("GET", "/files/tool.bin")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let dest_dir = temp_dir.path().join("nested/dest");
        let url = format!("{}/files/tool.bin", server.url());

        let path = download_file(&reqwest::Client::new(), &url, &dest_dir)
            .await
            .unwrap();

        assert_eq!(path, dest_dir.join("tool.bin"));
        assert_eq!(std::fs::read(&path).unwrap(), body);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_ne!(mode & 0o100, 0);
        }
    }

    #[tokio::test]
    async fn test_download_follows_redirect() {
        let mut server = mockito::Server::new_async().await;
        let target = format!("{}/real/tool.bin", server.url());
        let _redirect = server
            .mock("GET", "/latest/tool.bin")
            .with_status(302)
            .with_header("location", &target)
            .create_async()
            .await;
        let _real = server
            .mock("GET", "/real/tool.bin")
            .with_status(200)
            .with_body("payload")
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let url = format!("{}/latest/tool.bin", server.url());
        let path = download_file(&reqwest::Client::new(), &url, temp_dir.path())
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "tool.bin");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_download_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.zip")
            .with_status(404)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let url = format!("{}/missing.zip", server.url());
        let err = download_file(&reqwest::Client::new(), &url, temp_dir.path())
            .await
            .unwrap_err();

        match err {
            BinError::DownloadStatus { status, .. } => assert_eq!(status.as_u16(), 404),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_download_connection_refused() {
        let temp_dir = TempDir::new().unwrap();
        // Nothing listens on the discard port.
        let err = download_file(
            &reqwest::Client::new(),
            "http://127.0.0.1:9/x.zip",
            temp_dir.path(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BinError::DownloadFailed { .. }));
        assert!(!temp_dir.path().join("x.zip").exists());
    }
}
