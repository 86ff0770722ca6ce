//! Best-effort display metadata.
//!
//! Detail pages change markup without notice. Every field is tried against a
//! short list of selectors and falls back to a fixed value, so a page that
//! matches nothing still yields complete [`PackageMetadata`].

use async_trait::async_trait;
use scraper::{Html, Selector};
use warden_core::PackageId;
use warden_core::PackageMetadata;
use warden_core::metadata::{
    FALLBACK_DESCRIPTION, FALLBACK_NAME, FALLBACK_PUBLISHER, FALLBACK_RATING, FALLBACK_USER_COUNT,
    FALLBACK_VERSION,
};

/// Anything that can describe a package for display.
///
/// Implementations never fail; they return [`PackageMetadata::fallback`]
/// values for whatever they cannot determine.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Describe `id`.
    async fn metadata(&self, id: &PackageId) -> PackageMetadata;
}

/// A source that never touches the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineMetadata;

#[async_trait]
impl MetadataSource for OfflineMetadata {
    async fn metadata(&self, id: &PackageId) -> PackageMetadata {
        PackageMetadata::fallback(id.clone(), String::new())
    }
}

const NAME: &[&str] = &["h1.e-f-w", r#"[data-g-label="Extension name"]"#];
const DESCRIPTION: &[&str] = &[".C-b-p-j-Pb", r#"[data-g-label="Extension description"]"#];
const VERSION: &[&str] = &[".C-b-p-j-Pb-Oa", r#"[data-g-label="Extension version"]"#];
const PUBLISHER: &[&str] = &[".e-f-Me", r#"[data-g-label="Extension developer"]"#];
const USERS: &[&str] = &[".e-f-ih"];
const RATING: &[&str] = &[".rsw-stars"];
const ICON: &[&str] = &["img.e-f-s", ".webstore-test-wall-tile img"];

/// Text of every element matching the first selector that yields any.
fn text_of(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        let text: String = doc.select(&selector).flat_map(|el| el.text()).collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_owned())
    })
}

/// `attr` of the first element matching the first selector that has it.
fn attr_of(doc: &Html, selectors: &[&str], attr: &str) -> Option<String> {
    selectors.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        let value = doc.select(&selector).next()?.value().attr(attr)?.trim();
        (!value.is_empty()).then(|| value.to_owned())
    })
}

/// Scrape a detail page.
#[must_use]
pub fn parse_metadata(html: &str, id: &PackageId, detail_url: &str) -> PackageMetadata {
    let doc = Html::parse_document(html);
    let or = |value: Option<String>, fallback: &str| value.unwrap_or_else(|| fallback.to_owned());

    let icon_url = attr_of(&doc, ICON, "src").map(|src| {
        if src.starts_with("//") {
            format!("https:{src}")
        } else {
            src
        }
    });

    PackageMetadata {
        id: id.clone(),
        name: or(text_of(&doc, NAME), FALLBACK_NAME),
        description: or(text_of(&doc, DESCRIPTION), FALLBACK_DESCRIPTION),
        version: or(text_of(&doc, VERSION), FALLBACK_VERSION),
        publisher: or(text_of(&doc, PUBLISHER), FALLBACK_PUBLISHER),
        rating: or(attr_of(&doc, RATING, "title"), FALLBACK_RATING),
        user_count: or(text_of(&doc, USERS), FALLBACK_USER_COUNT),
        icon_url,
        detail_url: detail_url.to_owned(),
    }
}
