//! Shared test harness for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use warden_catalog::{CatalogClient, CatalogSettings, PACKAGE_CONTENT_TYPE};
use warden_core::dirs::WardenHome;
use warden_installer::{InstallOptions, InstallOutcome, InstallResult, Installer};
use warden_policy::SecurityPolicy;
use warden_registry::{BrokerSettings, PermissionBroker, Registry};
use warden_storage::{FileKvStore, KvStore};
use zip::write::SimpleFileOptions;

/// Every component of an installation, wired against one temporary home.
///
/// State lives in a [`FileKvStore`], so [`Harness::reopen`] observes exactly
/// what a restarted process would.
pub struct Harness {
    /// Owns the home directory and scratch files.
    pub dir: TempDir,
    /// The home under `dir`.
    pub home: WardenHome,
    /// Capability policy.
    pub policy: Arc<SecurityPolicy>,
    /// Registry of installed packages.
    pub registry: Arc<Registry>,
    /// Permission broker.
    pub broker: Arc<PermissionBroker>,
    /// Installer over all of the above.
    pub installer: Installer,
}

impl Harness {
    /// A harness with the default catalog endpoints.
    pub async fn new() -> Self {
        Self::with_catalog(CatalogSettings::default()).await
    }

    /// A harness whose catalog client uses `settings`.
    pub async fn with_catalog(settings: CatalogSettings) -> Self {
        Self::open(tempfile::tempdir().unwrap(), settings, BrokerSettings::default()).await
    }

    /// A harness whose broker uses `settings`.
    pub async fn with_broker(settings: BrokerSettings) -> Self {
        Self::open(tempfile::tempdir().unwrap(), CatalogSettings::default(), settings).await
    }

    async fn open(dir: TempDir, catalog: CatalogSettings, broker: BrokerSettings) -> Self {
        let home = WardenHome::from_path(dir.path().join("home"));
        home.ensure().unwrap();

        let store: Arc<dyn KvStore> = Arc::new(FileKvStore::open(home.state_dir()).unwrap());
        let registry = Arc::new(
            Registry::open(home.clone(), Arc::clone(&store))
                .await
                .unwrap(),
        );
        let policy = Arc::new(SecurityPolicy::default());
        let broker = Arc::new(
            PermissionBroker::open(Arc::clone(&registry), Arc::clone(&policy), store, broker)
                .await
                .unwrap(),
        );
        let catalog = CatalogClient::new(catalog).unwrap();
        let installer = Installer::new(
            home.clone(),
            catalog,
            Arc::clone(&policy),
            Arc::clone(&registry),
            Arc::clone(&broker),
        )
        .with_metadata_source(Arc::new(warden_catalog::OfflineMetadata));

        Self {
            dir,
            home,
            policy,
            registry,
            broker,
            installer,
        }
    }

    /// Drop every component and load them again from disk.
    pub async fn reopen(self) -> Self {
        let settings = self.broker.settings();
        let Self {
            dir,
            installer,
            broker,
            registry,
            ..
        } = self;
        drop((installer, broker, registry));
        Self::open(dir, CatalogSettings::default(), settings).await
    }

    /// Write `bytes` to a scratch file outside the home.
    pub fn write(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Install a local container or directory.
    pub async fn install_local(&self, path: &Path, replace: bool) -> InstallResult<InstallOutcome> {
        self.installer
            .install_local(
                path,
                InstallOptions { replace },
                |_| {},
                &CancellationToken::new(),
            )
            .await
    }

    /// Nothing left behind in the scratch area.
    pub fn tmp_is_empty(&self) -> bool {
        is_empty_dir(&self.home.tmp_dir())
    }

    /// No package directories on disk.
    pub fn packages_is_empty(&self) -> bool {
        is_empty_dir(&self.home.packages_dir())
    }
}

/// `true` if `path` is missing or has no entries.
pub fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).map_or(true, |mut entries| entries.next().is_none())
}

/// A zip archive holding `entries` in order.
pub fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, body) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A version 3 container with an opaque four-byte header.
pub fn crx3(payload: &[u8]) -> Vec<u8> {
    let mut out = b"Cr24".to_vec();
    out.extend(3u32.to_le_bytes());
    out.extend(4u32.to_le_bytes());
    out.extend([0x0a, 0x02, 0x08, 0x01]);
    out.extend(payload);
    out
}

/// A version 2 container with `key` and a dummy signature.
pub fn crx2(key: &[u8], payload: &[u8]) -> Vec<u8> {
    let signature = b"unchecked-signature";
    let mut out = b"Cr24".to_vec();
    out.extend(2u32.to_le_bytes());
    out.extend(u32::try_from(key.len()).unwrap().to_le_bytes());
    out.extend(u32::try_from(signature.len()).unwrap().to_le_bytes());
    out.extend(key);
    out.extend(signature);
    out.extend(payload);
    out
}

/// A minimal schema 3 manifest requesting `permissions`.
pub fn manifest(name: &str, permissions: &[&str]) -> Vec<u8> {
    json!({
        "name": name,
        "version": "1.0.0",
        "manifest_version": 3,
        "description": format!("{name} test package"),
        "permissions": permissions,
    })
    .to_string()
    .into_bytes()
}

/// A container with a manifest and one script.
pub fn package(name: &str, permissions: &[&str]) -> Vec<u8> {
    crx3(&archive(&[
        ("manifest.json", &manifest(name, permissions)),
        ("js/background.js", b"chrome.runtime.onInstalled.addListener(() => {});"),
    ]))
}

/// A complete HTTP/1.1 response with `Connection: close`.
pub fn http_ok(content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

/// A container response as the catalog serves it.
pub fn http_package(body: &[u8]) -> Vec<u8> {
    http_ok(PACKAGE_CONTENT_TYPE, body)
}

/// Serve one canned response per connection, in order.
pub async fn serve(responses: Vec<Vec<u8>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
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
            sock.write_all(&canned).await.unwrap();
            let _ = sock.shutdown().await;
        }
    });
    addr
}

/// Catalog settings pointing both endpoints at `addr`.
pub fn local_catalog(addr: SocketAddr) -> CatalogSettings {
    CatalogSettings {
        detail_base_url: format!("http://{addr}/detail"),
        download_base_url: format!("http://{addr}/crx"),
        ..CatalogSettings::default()
    }
}
