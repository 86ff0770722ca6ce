//! Catalog URL and id recognition.

use std::sync::LazyLock;

use regex::Regex;
use warden_core::PackageId;

use crate::error::{CatalogError, CatalogResult};

// The id segment must be exactly 32 letters: it is followed by a path,
// query or fragment delimiter, or the end of input.
static NAMED_DETAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)chrome\.google\.com/webstore/detail/[^/?#]+/([a-z]{32})(?:[/?#]|$)")
        .expect("invalid regex")
});
static BARE_DETAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)chrome\.google\.com/webstore/detail/([a-z]{32})(?:[/?#]|$)")
        .expect("invalid regex")
});
static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z]{32}$").expect("invalid regex"));
static DETAIL_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)chrome\.google\.com/webstore/detail").expect("invalid regex")
});

/// Resolve user input into a package id.
///
/// Accepts `.../detail/<name>/<id>`, `.../detail/<id>`, or a bare id, in
/// any letter case. The id is returned lowercase.
///
/// # Errors
///
/// Returns [`CatalogError::InvalidIdentifier`] for anything else.
pub fn resolve_identifier(input: &str) -> CatalogResult<PackageId> {
    let input = input.trim();
    let candidate = [&*NAMED_DETAIL, &*BARE_DETAIL]
        .iter()
        .find_map(|re| re.captures(input))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .or_else(|| BARE_ID.is_match(input).then_some(input));

    candidate
        .and_then(|id| PackageId::new(id.to_ascii_lowercase()).ok())
        .ok_or_else(|| CatalogError::InvalidIdentifier(input.to_owned()))
}

/// Cheap pre-check for user input: mentions the catalog detail path, or is a
/// bare id. A `true` here does not guarantee [`resolve_identifier`] succeeds.
#[must_use]
pub fn is_catalog_url(input: &str) -> bool {
    let input = input.trim();
    DETAIL_PATH.is_match(input) || BARE_ID.is_match(input)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const ID: &str = "cjpalhdlnbpafiamejdnhcphjbkeiagm";

    #[rstest]
    #[case("https://chrome.google.com/webstore/detail/ublock-origin/cjpalhdlnbpafiamejdnhcphjbkeiagm")]
    #[case("https://chrome.google.com/webstore/detail/cjpalhdlnbpafiamejdnhcphjbkeiagm")]
    #[case("https://chrome.google.com/webstore/detail/ublock/CJPALHDLNBPAFIAMEJDNHCPHJBKEIAGM?hl=en")]
    #[case("chrome.google.com/webstore/detail/cjpalhdlnbpafiamejdnhcphjbkeiagm/")]
    #[case("http://Chrome.Google.com/webstore/detail/x/cjpalhdlnbpafiamejdnhcphjbkeiagm#reviews")]
    #[case("cjpalhdlnbpafiamejdnhcphjbkeiagm")]
    #[case("  CjPaLhDlNbPaFiAmEjDnHcPhJbKeIaGm\n")]
    fn resolves_supported_shapes(#[case] input: &str) {
        assert_eq!(resolve_identifier(input).unwrap().as_str(), ID);
    }

    #[rstest]
    #[case("")]
    #[case("ublock origin")]
    #[case("cjpalhdlnbpafiamejdnhcphjbkeiag")]
    #[case("cjpalhdlnbpafiamejdnhcphjbkeiagmx")]
    #[case("cjpalhdlnbpafiamejdnhcphjbkeiag1")]
    #[case("https://chrome.google.com/webstore/detail/ublock-origin")]
    #[case("https://chrome.google.com/webstore/detail/cjpalhdlnbpafiamejdnhcphjbkeiagmzz")]
    #[case("https://example.com/cjpalhdlnbpafiamejdnhcphjbkeiagm")]
    fn rejects_everything_else(#[case] input: &str) {
        assert!(matches!(
            resolve_identifier(input),
            Err(CatalogError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn catalog_url_precheck() {
        assert!(is_catalog_url(
            "https://chrome.google.com/webstore/detail/ublock-origin"
        ));
        assert!(is_catalog_url(ID));
        assert!(!is_catalog_url("https://example.com/extension.crx"));
        assert!(!is_catalog_url("/home/me/ext"));
    }
}
