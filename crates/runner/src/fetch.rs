//! Artifact downloads.
//!
//! Two transports fetch the same files: the in-process HTTP client and an
//! external `curl`. Both write to `<destination>.part` and rename on
//! success, so an interrupted download never looks like a finished one.

use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use vcpkg_prebuild_core::emit::curl_arguments;
use vcpkg_prebuild_core::layout::{DOWNLOAD_LOG, partial_path};
use vcpkg_prebuild_core::{Error, Result};

use crate::process::{StepLimits, run_logged};

/// How downloads reach the network.
#[derive(Debug, Clone)]
pub enum Downloader {
    /// In-process HTTP client
    Http(HttpFetcher),
    /// External curl binary
    Curl(PathBuf),
}

impl Downloader {
    /// Fetch `url` into `destination`, asking for `accept`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DownloadFailed`] if the transfer fails or the server
    /// answers with anything but `200 OK`, and [`Error::EntryNotFound`] if
    /// the transfer reported success without writing `destination`.
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        accept: &str,
        limits: &StepLimits,
    ) -> Result<()> {
        let partial = partial_path(destination);
        match self {
            Self::Http(http) => http.fetch(url, &partial, accept, limits).await?,
            Self::Curl(curl) => fetch_with_curl(curl, url, &partial, accept, limits).await?,
        }
        match tokio::fs::rename(&partial, destination).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::entry_not_found(destination));
            }
            Err(e) => {
                return Err(Error::io(e, Some(destination.to_path_buf()), "rename download"));
            }
        }
        info!(%url, destination = %destination.display(), "Downloaded");
        Ok(())
    }
}

/// Async HTTP downloader.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the crate's user agent.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the TLS backend cannot initialize.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("vcpkg-prebuild/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn fetch(&self, url: &str, partial: &Path, accept: &str, limits: &StepLimits) -> Result<()> {
        let transfer = self.transfer(url, partial, accept);
        let outcome = tokio::select! {
            outcome = transfer => outcome,
            () = tokio::time::sleep(limits.timeout) => {
                Err(Error::timeout(format!("Download {url}"), limits.timeout.as_secs()))
            }
            () = limits.cancel.cancelled() => Err(Error::cancelled(format!("Download {url}"))),
        };
        if outcome.is_err() {
            let _ = tokio::fs::remove_file(partial).await;
        }
        outcome
    }

    async fn transfer(&self, url: &str, partial: &Path, accept: &str) -> Result<()> {
        debug!(%url, "Downloading over HTTP");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| Error::download_failed(url, e.to_string()))?;

        // partial content or an empty reply would be trusted by the presence check
        if response.status() != StatusCode::OK {
            return Err(Error::download_failed(
                url,
                format!("HTTP {}", response.status()),
            ));
        }

        let mut file = tokio::fs::File::create(partial)
            .await
            .map_err(|e| Error::io(e, Some(partial.to_path_buf()), "create download"))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::download_failed(url, e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(e, Some(partial.to_path_buf()), "write download"))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| Error::io(e, Some(partial.to_path_buf()), "flush download"))?;

        debug!(%url, bytes = written, "Transfer complete");
        Ok(())
    }
}

async fn fetch_with_curl(
    curl: &Path,
    url: &str,
    partial: &Path,
    accept: &str,
    limits: &StepLimits,
) -> Result<()> {
    let dir = partial.parent().unwrap_or_else(|| Path::new("."));
    let log = dir.join(DOWNLOAD_LOG);
    let label = format!("Download {url}");

    let status = run_logged(
        &label,
        curl,
        &curl_arguments(url, partial, accept),
        None,
        &log,
        limits,
    )
    .await;

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => {
            let _ = tokio::fs::remove_file(partial).await;
            Err(Error::download_failed(
                url,
                format!("curl exited with {status}, see {}", log.display()),
            ))
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(partial).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn limits() -> StepLimits {
        StepLimits::new(Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_http_download_sends_accept_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tool"))
            .and(header("accept", "application/octet-stream"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"binary".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("vcpkg");
        let downloader = Downloader::Http(HttpFetcher::new().unwrap());
        downloader
            .fetch(
                &format!("{}/tool", server.uri()),
                &dest,
                "application/octet-stream",
                &limits(),
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"binary");
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_http_error_status_fails_without_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("missing.zip");
        let downloader = Downloader::Http(HttpFetcher::new().unwrap());
        let result = downloader
            .fetch(
                &format!("{}/missing.zip", server.uri()),
                &dest,
                "application/zip",
                &limits(),
            )
            .await;

        match result {
            Err(Error::DownloadFailed { message, .. }) => assert!(message.contains("404")),
            other => panic!("expected download failure, got {other:?}"),
        }
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_http_no_content_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vcpkg/2025.04.09.zip"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("vcpkg-2025.04.09.zip");
        let downloader = Downloader::Http(HttpFetcher::new().unwrap());
        let result = downloader
            .fetch(
                &format!("{}/vcpkg/2025.04.09.zip", server.uri()),
                &dest,
                "application/zip",
                &limits(),
            )
            .await;

        match result {
            Err(Error::DownloadFailed { message, .. }) => assert!(message.contains("204")),
            other => panic!("expected download failure, got {other:?}"),
        }
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_http_partial_content_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"half".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("vcpkg");
        let downloader = Downloader::Http(HttpFetcher::new().unwrap());
        let result = downloader
            .fetch(&server.uri(), &dest, "application/octet-stream", &limits())
            .await;

        assert!(matches!(result, Err(Error::DownloadFailed { .. })));
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_curl_success_without_output_is_missing_entry() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let curl = dir.path().join("curl");
        std::fs::write(&curl, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&curl, std::fs::Permissions::from_mode(0o755)).unwrap();

        let dest = dir.path().join("vcpkg");
        let result = Downloader::Curl(curl)
            .fetch("https://mirror.test/vcpkg", &dest, "application/octet-stream", &limits())
            .await;

        match result {
            Err(Error::EntryNotFound { path }) => assert_eq!(path, dest),
            other => panic!("expected missing entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_http_download_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let downloader = Downloader::Http(HttpFetcher::new().unwrap());
        let result = downloader
            .fetch(
                &server.uri(),
                &dir.path().join("slow"),
                "application/zip",
                &StepLimits::new(Duration::from_millis(100)),
            )
            .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }
}
