//! Installed package records and their read-only projections.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{Manifest, PackageId, PackageMetadata, Provenance};

/// A committed package, owned by the [`Registry`](crate::Registry).
///
/// `enabled` is not persisted with the record; the enabled sidecar is the
/// single source for it and the registry fills it in on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackageRecord {
    /// Package identifier.
    pub id: PackageId,
    /// Directory holding the extracted package.
    pub storage_path: PathBuf,
    /// Manifest read from the extracted package.
    pub manifest: Manifest,
    /// Whether the package is in the enabled set.
    #[serde(skip)]
    pub enabled: bool,
    /// Commit time.
    pub installed_at: DateTime<Utc>,
    /// Where the package came from.
    pub provenance: Provenance,
    /// Capabilities granted by the broker.
    #[serde(default)]
    pub granted_capabilities: BTreeSet<String>,
    /// Catalog metadata captured at install time. `None` for local installs.
    #[serde(default)]
    pub metadata: Option<PackageMetadata>,
}

impl InstalledPackageRecord {
    /// Project into a listing row.
    #[must_use]
    pub fn summary(&self) -> PackageSummary {
        let description = self
            .metadata
            .as_ref()
            .map(|m| m.description.clone())
            .or_else(|| {
                self.manifest
                    .raw()
                    .get("description")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_owned)
            })
            .unwrap_or_default();

        PackageSummary {
            id: self.id.clone(),
            name: self.manifest.display_name().to_owned(),
            version: self.manifest.display_version().to_owned(),
            description,
            enabled: self.enabled,
            permissions: self.manifest.requested_permissions().to_vec(),
            installed_at: self.installed_at,
            provenance: self.provenance.clone(),
        }
    }
}

/// One row of [`Registry::list`](crate::Registry::list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSummary {
    /// Package identifier.
    pub id: PackageId,
    /// Manifest name.
    pub name: String,
    /// Manifest version.
    pub version: String,
    /// Catalog description, else the manifest's, else empty.
    pub description: String,
    /// Whether the package is enabled.
    pub enabled: bool,
    /// Permissions the manifest requests.
    pub permissions: Vec<String>,
    /// Commit time.
    pub installed_at: DateTime<Utc>,
    /// Where the package came from.
    pub provenance: Provenance,
}

/// Staged package handed to [`Registry::commit_install`](crate::Registry::commit_install).
#[derive(Debug, Clone)]
pub struct CommitRequest {
    /// Package identifier.
    pub id: PackageId,
    /// Validated extraction to move into permanent storage.
    pub staged_dir: PathBuf,
    /// Manifest read from `staged_dir`.
    pub manifest: Manifest,
    /// Where the package came from.
    pub provenance: Provenance,
    /// Catalog metadata, if any.
    pub metadata: Option<PackageMetadata>,
    /// Overwrite an existing installation of the same id.
    pub replace: bool,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record() -> InstalledPackageRecord {
        InstalledPackageRecord {
            id: PackageId::new("aapocclcgogkmnckokdopfmhonfmgoek").unwrap(),
            storage_path: PathBuf::from("/tmp/pkg"),
            manifest: Manifest::from_value(json!({
                "name": "Demo",
                "version": "2.1",
                "description": "from manifest",
                "permissions": ["storage", "tabs"],
            }))
            .unwrap(),
            enabled: true,
            installed_at: Utc::now(),
            provenance: Provenance::Local {
                source_path: PathBuf::from("/src/demo"),
            },
            granted_capabilities: BTreeSet::from(["storage".to_owned()]),
            metadata: None,
        }
    }

    #[test]
    fn enabled_flag_is_not_persisted() {
        let rec = record();
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json.get("enabled").is_none());

        let back: InstalledPackageRecord = serde_json::from_value(json).unwrap();
        assert!(!back.enabled);
        assert_eq!(back.granted_capabilities, rec.granted_capabilities);
        assert_eq!(back.manifest, rec.manifest);
    }

    #[test]
    fn summary_prefers_catalog_description() {
        let mut rec = record();
        let summary = rec.summary();
        assert_eq!(summary.name, "Demo");
        assert_eq!(summary.version, "2.1");
        assert_eq!(summary.description, "from manifest");
        assert_eq!(summary.permissions, vec!["storage", "tabs"]);
        assert!(summary.enabled);

        let mut meta = PackageMetadata::fallback(rec.id.clone(), "");
        meta.description = "from catalog".into();
        rec.metadata = Some(meta);
        assert_eq!(rec.summary().description, "from catalog");
    }
}
