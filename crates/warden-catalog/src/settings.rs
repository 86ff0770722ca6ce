//! Catalog endpoints and request parameters.

use std::time::Duration;

use url::Url;
use warden_core::PackageId;

use crate::error::{CatalogError, CatalogResult};

/// Endpoints, platform parameters and limits for [`CatalogClient`](crate::CatalogClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
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
    /// User-Agent header.
    pub user_agent: String,
    /// Timeout for the detail page.
    pub metadata_timeout: Duration,
    /// Timeout for the whole package download, body included.
    pub download_timeout: Duration,
    /// Redirects followed on either request.
    pub max_redirects: usize,
    /// Downloads larger than this are refused.
    pub max_package_bytes: u64,
}

impl Default for CatalogSettings {
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
            metadata_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(30),
            max_redirects: 10,
            max_package_bytes: 52_428_800,
        }
    }
}

fn parse_endpoint(raw: &str) -> CatalogResult<Url> {
    Url::parse(raw).map_err(|e| CatalogError::InvalidEndpoint {
        url: raw.to_owned(),
        message: e.to_string(),
    })
}

impl CatalogSettings {
    /// Detail page of `id`: `{detail_base_url}/{id}`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidEndpoint`] if the base URL is invalid.
    pub fn detail_url(&self, id: &PackageId) -> CatalogResult<Url> {
        let base = self.detail_base_url.trim_end_matches('/');
        parse_endpoint(&format!("{base}/{id}"))
    }

    /// Download URL of `id`.
    ///
    /// The `x` parameter is itself a query string (`id=..&installsource=..&uc`)
    /// and is percent-encoded as a single value.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidEndpoint`] if the base URL is invalid.
    pub fn download_url(&self, id: &PackageId) -> CatalogResult<Url> {
        let mut url = parse_endpoint(&self.download_base_url)?;
        url.query_pairs_mut()
            .append_pair("response", "redirect")
            .append_pair("os", &self.os)
            .append_pair("arch", &self.arch)
            .append_pair("os_arch", &self.os_arch)
            .append_pair("nacl_arch", &self.nacl_arch)
            .append_pair("prod", "chromecrx")
            .append_pair("prodchannel", "stable")
            .append_pair("prodversion", &self.prod_version)
            .append_pair("lang", &self.lang)
            .append_pair("acceptformat", "crx2,crx3")
            .append_pair("x", &format!("id={id}&installsource=ondemand&uc"));
        Ok(url)
    }
}
