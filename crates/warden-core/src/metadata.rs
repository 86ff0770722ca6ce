//! Display metadata for catalog packages.

use serde::{Deserialize, Serialize};

use crate::id::PackageId;

/// Fallback display name.
pub const FALLBACK_NAME: &str = "Unknown Extension";
/// Fallback description.
pub const FALLBACK_DESCRIPTION: &str = "No description available";
/// Fallback version.
pub const FALLBACK_VERSION: &str = "1.0.0";
/// Fallback publisher.
pub const FALLBACK_PUBLISHER: &str = "Unknown Developer";
/// Fallback rating.
pub const FALLBACK_RATING: &str = "No rating";
/// Fallback user count.
pub const FALLBACK_USER_COUNT: &str = "0 users";

/// Cosmetic information about a catalog package.
///
/// Every field has a fallback so a missing or unparsable detail page still
/// yields a complete value. Nothing in the admission path reads this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Package the metadata describes.
    pub id: PackageId,
    /// Display name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Version as listed in the catalog.
    pub version: String,
    /// Publisher name.
    pub publisher: String,
    /// Rating text (e.g. `"Average rating 4.7 out of 5"`).
    pub rating: String,
    /// User count text (e.g. `"10,000,000+ users"`).
    pub user_count: String,
    /// Absolute icon URL, if the page had one.
    pub icon_url: Option<String>,
    /// Detail page the metadata came from.
    pub detail_url: String,
}

impl PackageMetadata {
    /// All-fallback metadata for `id`.
    #[must_use]
    pub fn fallback(id: PackageId, detail_url: impl Into<String>) -> Self {
        Self {
            id,
            name: FALLBACK_NAME.to_owned(),
            description: FALLBACK_DESCRIPTION.to_owned(),
            version: FALLBACK_VERSION.to_owned(),
            publisher: FALLBACK_PUBLISHER.to_owned(),
            rating: FALLBACK_RATING.to_owned(),
            user_count: FALLBACK_USER_COUNT.to_owned(),
            icon_url: None,
            detail_url: detail_url.into(),
        }
    }
}
