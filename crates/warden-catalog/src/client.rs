//! HTTP client for the catalog.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use warden_core::{PackageId, PackageMetadata};

use crate::error::{CatalogError, CatalogResult};
use crate::metadata::{MetadataSource, parse_metadata};
use crate::settings::CatalogSettings;

/// Content type the distribution endpoint is expected to send.
pub const PACKAGE_CONTENT_TYPE: &str = "application/x-chrome-extension";

/// Progress of a download with a known length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// `bytes / total`, in `0.0..=1.0`.
    pub ratio: f64,
    /// Bytes written so far.
    pub bytes: u64,
    /// Declared content length.
    pub total: u64,
}

/// A completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    /// Where the package was written.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
    /// `Content-Type` as sent by the server.
    pub content_type: Option<String>,
    /// Non-fatal oddities (unexpected content type).
    pub warnings: Vec<String>,
}

/// Catalog client: metadata scraping and package download.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    settings: Arc<CatalogSettings>,
}

fn request_error(e: &reqwest::Error, operation: &'static str, timeout: Duration) -> CatalogError {
    if e.is_timeout() {
        CatalogError::Timeout {
            operation,
            secs: timeout.as_secs(),
        }
    } else {
        CatalogError::Http(e.to_string())
    }
}

/// Deletes a partially written download unless disarmed.
struct PartialDownload<'a> {
    path: &'a Path,
    armed: bool,
}

impl PartialDownload<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialDownload<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(path = %self.path.display(), "Removing partial download");
            let _ = std::fs::remove_file(self.path);
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn progress(bytes: u64, total: u64) -> DownloadProgress {
    DownloadProgress {
        ratio: (bytes as f64 / total as f64).min(1.0),
        bytes,
        total,
    }
}

impl CatalogClient {
    /// Build a client for `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Http`] if the TLS backend cannot be initialized.
    pub fn new(settings: CatalogSettings) -> CatalogResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
            .build()
            .map_err(|e| CatalogError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            settings: Arc::new(settings),
        })
    }

    /// The settings this client was built with.
    #[must_use]
    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    /// Fetch and scrape the detail page of `id`.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, transport failure or non-success status.
    pub async fn try_fetch_metadata(&self, id: &PackageId) -> CatalogResult<PackageMetadata> {
        let url = self.settings.detail_url(id)?;
        let timeout = self.settings.metadata_timeout;
        debug!(package_id = %id, %url, "Fetching package metadata");

        let response = self
            .http
            .get(url.clone())
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(&e, "metadata fetch", timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| request_error(&e, "metadata fetch", timeout))?;
        Ok(parse_metadata(&html, id, url.as_str()))
    }

    /// Metadata for `id`, degrading to fallback values on any failure.
    pub async fn fetch_metadata(&self, id: &PackageId) -> PackageMetadata {
        match self.try_fetch_metadata(id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(package_id = %id, error = %e, "Metadata unavailable, using fallback");
                let detail_url = self
                    .settings
                    .detail_url(id)
                    .map(String::from)
                    .unwrap_or_default();
                PackageMetadata::fallback(id.clone(), detail_url)
            },
        }
    }

    /// Download the package container of `id` to `destination`.
    ///
    /// `on_progress` is called after every chunk when the server declared a
    /// content length. A non-success status aborts before the file is
    /// created. If the body fails mid-stream, or the returned future is
    /// dropped, the partial file is removed.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, transport failure, non-success status,
    /// oversize body, or a write failure.
    pub async fn fetch_package<F>(
        &self,
        id: &PackageId,
        destination: &Path,
        mut on_progress: F,
    ) -> CatalogResult<Download>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let url = self.settings.download_url(id)?;
        let timeout = self.settings.download_timeout;
        let limit = self.settings.max_package_bytes;
        info!(package_id = %id, "Downloading package");
        debug!(%url, "Download URL");

        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, format!("{PACKAGE_CONTENT_TYPE},*/*"))
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(&e, "download", timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total = response.content_length();
        if let Some(len) = total
            && len > limit
        {
            return Err(CatalogError::TooLarge { size: len, limit });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let mut warnings = Vec::new();
        if !content_type
            .as_deref()
            .is_some_and(|ct| ct.contains(PACKAGE_CONTENT_TYPE))
        {
            let msg = format!(
                "unexpected content type {}",
                content_type.as_deref().unwrap_or("<none>")
            );
            warn!(package_id = %id, content_type = ?content_type, "Unexpected content type");
            warnings.push(msg);
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(destination).await?;
        let guard = PartialDownload {
            path: destination,
            armed: true,
        };

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| request_error(&e, "download", timeout))?;
            written = written.saturating_add(chunk.len() as u64);
            if written > limit {
                return Err(CatalogError::TooLarge {
                    size: written,
                    limit,
                });
            }
            file.write_all(&chunk).await?;
            if let Some(total) = total.filter(|t| *t > 0) {
                on_progress(progress(written, total));
            }
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        guard.disarm();

        info!(package_id = %id, bytes = written, "Package downloaded");
        Ok(Download {
            path: destination.to_path_buf(),
            bytes: written,
            content_type,
            warnings,
        })
    }
}

#[async_trait]
impl MetadataSource for CatalogClient {
    async fn metadata(&self, id: &PackageId) -> PackageMetadata {
        self.fetch_metadata(id).await
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use warden_core::metadata::FALLBACK_NAME;

    use super::*;

    const ID: &str = "cjpalhdlnbpafiamejdnhcphjbkeiagm";

    fn id() -> PackageId {
        PackageId::new(ID).unwrap()
    }

    fn response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
        for (name, value) in headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        let mut out = out.into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn ok(content_type: &str, body: &[u8]) -> Vec<u8> {
        response(
            "200 OK",
            &[
                ("Content-Type", content_type),
                ("Content-Length", &body.len().to_string()),
            ],
            body,
        )
    }

    /// Serve one canned response per connection, in order. Returns the
    /// address and the request heads received.
    async fn serve(responses: Vec<Vec<u8>>) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            for canned in responses {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = sock.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                log.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&head).into_owned());
                sock.write_all(&canned).await.unwrap();
                let _ = sock.shutdown().await;
            }
        });
        (addr, seen)
    }

    /// Accept connections and never answer.
    async fn serve_stalled() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((sock, _)) = listener.accept().await {
                held.push(sock);
            }
        });
        addr
    }

    fn client(addr: SocketAddr) -> CatalogClient {
        CatalogClient::new(CatalogSettings {
            detail_base_url: format!("http://{addr}/detail"),
            download_base_url: format!("http://{addr}/crx"),
            metadata_timeout: Duration::from_millis(300),
            download_timeout: Duration::from_millis(500),
            max_package_bytes: 1024,
            ..CatalogSettings::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn metadata_is_scraped_from_detail_page() {
        let page = br#"<h1 class="e-f-w">uBlock Origin</h1><span class="e-f-ih">10M users</span>"#;
        let (addr, seen) = serve(vec![ok("text/html", page)]).await;

        let m = client(addr).fetch_metadata(&id()).await;
        assert_eq!(m.name, "uBlock Origin");
        assert_eq!(m.user_count, "10M users");
        assert_eq!(m.detail_url, format!("http://{addr}/detail/{ID}"));
        assert!(seen.lock().unwrap()[0].starts_with(&format!("GET /detail/{ID} ")));
    }

    #[tokio::test]
    async fn metadata_failure_degrades_to_fallback() {
        let (addr, _) = serve(vec![
            response("404 Not Found", &[("Content-Length", "0")], b""),
            response("404 Not Found", &[("Content-Length", "0")], b""),
        ])
        .await;
        let c = client(addr);

        assert!(matches!(
            c.try_fetch_metadata(&id()).await,
            Err(CatalogError::Status { status: 404, .. })
        ));
        let m = c.fetch_metadata(&id()).await;
        assert_eq!(m.name, FALLBACK_NAME);
        assert_eq!(m.detail_url, format!("http://{addr}/detail/{ID}"));
    }

    #[tokio::test]
    async fn metadata_timeout_degrades_to_fallback() {
        let c = client(serve_stalled().await);
        assert!(matches!(
            c.try_fetch_metadata(&id()).await,
            Err(CatalogError::Timeout {
                operation: "metadata fetch",
                ..
            })
        ));
        assert_eq!(c.metadata(&id()).await.name, FALLBACK_NAME);
    }

    #[tokio::test]
    async fn download_streams_to_disk_with_progress() {
        let body = vec![7u8; 600];
        let (addr, seen) = serve(vec![ok(PACKAGE_CONTENT_TYPE, &body)]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dl").join("pkg.crx");

        let mut reports = Vec::new();
        let download = client(addr)
            .fetch_package(&id(), &dest, |p| reports.push(p))
            .await
            .unwrap();

        assert_eq!(download.bytes, 600);
        assert!(download.warnings.is_empty());
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        let last = reports.last().unwrap();
        assert_eq!((last.bytes, last.total), (600, 600));
        assert!((last.ratio - 1.0).abs() < f64::EPSILON);
        assert!(reports.windows(2).all(|w| w[0].bytes <= w[1].bytes));

        let head = seen.lock().unwrap()[0].clone();
        assert!(head.contains("x=id%3Dcjpalhdlnbpafiamejdnhcphjbkeiagm%26installsource%3Dondemand%26uc"));
    }

    #[tokio::test]
    async fn download_follows_redirects_and_flags_content_type() {
        let (addr, _) = serve(vec![
            response(
                "302 Found",
                &[("Location", "/blob/pkg.crx"), ("Content-Length", "0")],
                b"",
            ),
            ok("application/octet-stream", b"Cr24"),
        ])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pkg.crx");

        let download = client(addr).fetch_package(&id(), &dest, |_| {}).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"Cr24");
        assert_eq!(download.warnings.len(), 1);
        assert_eq!(
            download.content_type.as_deref(),
            Some("application/octet-stream")
        );
    }

    #[tokio::test]
    async fn error_status_writes_nothing() {
        let (addr, _) = serve(vec![response(
            "500 Internal Server Error",
            &[("Content-Length", "4")],
            b"oops",
        )])
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pkg.crx");

        let err = client(addr)
            .fetch_package(&id(), &dest, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Status { status: 500, .. }));
        assert!(err.is_retryable());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn oversized_download_is_refused_up_front() {
        let body = vec![0u8; 2048];
        let (addr, _) = serve(vec![ok(PACKAGE_CONTENT_TYPE, &body)]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pkg.crx");

        let err = client(addr)
            .fetch_package(&id(), &dest, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::TooLarge { size: 2048, limit: 1024 }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn truncated_body_removes_partial_file() {
        let canned = response(
            "200 OK",
            &[
                ("Content-Type", PACKAGE_CONTENT_TYPE),
                ("Content-Length", "900"),
            ],
            &[1u8; 100],
        );
        let (addr, _) = serve(vec![canned]).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pkg.crx");

        let result = client(addr).fetch_package(&id(), &dest, |_| {}).await;
        assert!(result.is_err());
        assert!(!dest.exists());
    }
}
