//! Configuration struct definitions.
//!
//! Every section is `#[serde(default)]`, so a user file only needs the keys it
//! changes. `Default` impls mirror `defaults.toml` exactly.

use serde::{Deserialize, Serialize};

/// Top-level warden configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog endpoints and HTTP behavior.
    pub catalog: CatalogConfig,
    /// Admission policy.
    pub policy: PolicyConfig,
    /// Archive extraction limits.
    pub extract: ExtractConfig,
    /// Permission broker timing.
    pub broker: BrokerConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// `[catalog]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base of the HTML detail page; the id is appended as a path segment.
    pub detail_base_url: String,
    /// Binary distribution endpoint.
    pub download_base_url: String,
    /// `os` query parameter.
    pub os: String,
    /// `arch` query parameter.
    pub arch: String,
    /// `os_arch` query parameter.
    pub os_arch: String,
    /// `nacl_arch` query parameter.
    pub nacl_arch: String,
    /// `prodversion` query parameter.
    pub prod_version: String,
    /// `lang` query parameter.
    pub lang: String,
    /// User-Agent header sent on every request.
    pub user_agent: String,
    /// Timeout for the metadata page fetch.
    pub metadata_timeout_secs: u64,
    /// Timeout for the package download.
    pub download_timeout_secs: u64,
    /// Redirects followed before giving up.
    pub max_redirects: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            detail_base_url: "https://chrome.google.com/webstore/detail".to_owned(),
            download_base_url: "https://clients2.google.com/service/update2/crx".to_owned(),
            os: "mac".to_owned(),
            arch: "x64".to_owned(),
            os_arch: "x86_64".to_owned(),
            nacl_arch: "x86-64".to_owned(),
            prod_version: "120.0.6099.109".to_owned(),
            lang: "en-US".to_owned(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_owned(),
            metadata_timeout_secs: 10,
            download_timeout_secs: 30,
            max_redirects: 10,
        }
    }
}

/// `[policy]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Capabilities granted without approval.
    pub allowed: Vec<String>,
    /// Capabilities that need explicit approval.
    pub escalation: Vec<String>,
    /// Capabilities that are never installable.
    pub blocked: Vec<String>,
    /// Content security policy template for package pages.
    pub csp_template: String,
    /// Ceiling on the extracted package size.
    pub max_package_bytes: u64,
    /// Ceiling on the extracted file count.
    pub max_file_count: u64,
    /// Ceiling on `manifest.json` size.
    pub max_manifest_bytes: u64,
    /// File extensions flagged (as warnings) by the suspicious-file scan.
    pub suspicious_extensions: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed: owned(&[
                "tabs",
                "storage",
                "contextMenus",
                "browserAction",
                "activeTab",
                "background",
                "notifications",
                "bookmarks",
                "history",
            ]),
            escalation: owned(&[
                "webRequest",
                "webRequestBlocking",
                "proxy",
                "privacy",
                "management",
                "nativeMessaging",
                "debugger",
            ]),
            blocked: owned(&[
                "experimental",
                "system.cpu",
                "system.memory",
                "system.storage",
                "fileSystem",
                "serial",
                "usb",
                "bluetooth",
            ]),
            csp_template: "default-src 'self'; script-src 'self'; object-src 'none'; \
                           style-src 'self' 'unsafe-inline';"
                .to_owned(),
            max_package_bytes: 52_428_800,
            max_file_count: 1000,
            max_manifest_bytes: 1_048_576,
            suspicious_extensions: owned(&["exe", "dll", "so", "dylib", "bat", "sh", "scr"]),
        }
    }
}

/// `[extract]` section.
///
/// Hard limits applied while unpacking, before any policy check sees the
/// files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Maximum number of archive entries.
    pub max_entries: usize,
    /// Maximum decompressed bytes across all entries.
    pub max_total_bytes: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_total_bytes: 500_000_000,
        }
    }
}

/// `[broker]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Lifetime of a pending escalation request.
    pub request_ttl_secs: u64,
    /// Interval of the background expiry sweep.
    pub sweep_interval_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            request_ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level.
    pub level: String,
    /// `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// `stderr`, `stdout`, or `file` for daily files under `{home}/logs/`.
    pub target: String,
    /// Extra filter directives.
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            target: "stderr".to_owned(),
            directives: Vec::new(),
        }
    }
}
