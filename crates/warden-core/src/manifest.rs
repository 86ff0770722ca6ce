//! Typed view of an untrusted package manifest.
//!
//! The manifest is hostile input until the policy validator accepts it. It is
//! parsed from JSON into a structure where every field records whether it was
//! absent, present with the wrong JSON type, or present and well-typed. The
//! validator works exclusively on this structure.
//!
//! The raw JSON document is retained so persisted records round-trip the
//! manifest exactly as shipped.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// File name of the manifest at the root of an extracted package.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Presence flag for a single manifest field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Field<T> {
    /// The key is not in the document.
    #[default]
    Missing,
    /// The key is present but holds the wrong JSON type.
    Malformed {
        /// JSON type actually found (`"number"`, `"object"`, ...).
        found: &'static str,
    },
    /// The key is present and well-typed.
    Present(T),
}

impl<T> Field<T> {
    /// Returns the value if present and well-typed.
    #[must_use]
    pub fn present(&self) -> Option<&T> {
        match self {
            Self::Present(v) => Some(v),
            _ => None,
        }
    }

    /// Whether the key was present and well-typed.
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Whether the key appeared at all (well-typed or not).
    #[must_use]
    pub fn is_declared(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    fn parse(value: Option<&Value>, extract: impl FnOnce(&Value) -> Option<T>) -> Self {
        match value {
            None => Self::Missing,
            Some(v) => match extract(v) {
                Some(t) => Self::Present(t),
                None => Self::Malformed {
                    found: json_type(v),
                },
            },
        }
    }
}

/// A `content_scripts` entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentScript {
    /// Match patterns the script is injected into.
    pub matches: Field<Vec<String>>,
    /// Script files.
    pub js: Field<Vec<String>>,
    /// Style files.
    pub css: Field<Vec<String>>,
}

/// The `background` section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Background {
    /// Schema 2 background scripts.
    pub scripts: Field<Vec<String>>,
    /// Schema 2 background page.
    pub page: Field<String>,
    /// Schema 3 service worker.
    pub service_worker: Field<String>,
}

/// A `web_accessible_resources` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebAccessibleResource {
    /// Schema 2 form: a bare resource path.
    Path(String),
    /// Schema 3 form: resources plus the pages allowed to load them.
    Rule {
        /// Resource paths.
        resources: Field<Vec<String>>,
        /// Match patterns.
        matches: Field<Vec<String>>,
    },
    /// Neither a string nor an object.
    Invalid {
        /// JSON type actually found.
        found: &'static str,
    },
}

/// A parsed package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Manifest {
    /// Package name.
    pub name: Field<String>,
    /// Package version string.
    pub version: Field<String>,
    /// `manifest_version` (2 or 3 when valid).
    pub schema_version: Field<u64>,
    /// Free-form description (display only).
    pub description: Field<String>,
    /// Requested capabilities.
    pub permissions: Field<Vec<String>>,
    /// Content script declarations.
    pub content_scripts: Field<Vec<ContentScript>>,
    /// Background declaration.
    pub background: Field<Background>,
    /// Web-accessible resource declarations.
    pub web_accessible_resources: Field<Vec<WebAccessibleResource>>,
    raw: Value,
}

impl Manifest {
    /// Parse a manifest from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ManifestParse`] for invalid JSON and
    /// [`CoreError::ManifestNotObject`] if the top level is not an object.
    pub fn from_slice(bytes: &[u8]) -> CoreResult<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| CoreError::ManifestParse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Read and parse `manifest.json` from a package directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a parse error.
    pub fn load(package_dir: &Path) -> CoreResult<Self> {
        let bytes = std::fs::read(package_dir.join(MANIFEST_FILE_NAME))?;
        Self::from_slice(&bytes)
    }

    /// Build the typed view from an already-parsed JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ManifestNotObject`] if `value` is not an object.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        let Some(obj) = value.as_object() else {
            return Err(CoreError::ManifestNotObject {
                found: json_type(&value),
            });
        };

        let manifest = Self {
            name: Field::parse(obj.get("name"), string),
            version: Field::parse(obj.get("version"), string),
            schema_version: Field::parse(obj.get("manifest_version"), Value::as_u64),
            description: Field::parse(obj.get("description"), string),
            permissions: Field::parse(obj.get("permissions"), string_list),
            content_scripts: Field::parse(obj.get("content_scripts"), |v| {
                v.as_array()
                    .map(|entries| entries.iter().map(content_script).collect())
            }),
            background: Field::parse(obj.get("background"), background),
            web_accessible_resources: Field::parse(obj.get("web_accessible_resources"), |v| {
                v.as_array()
                    .map(|entries| entries.iter().map(web_accessible_resource).collect())
            }),
            raw: Value::Null,
        };
        Ok(Self {
            raw: value,
            ..manifest
        })
    }

    /// The manifest exactly as shipped.
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Name for display, or `"unknown"`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.present().map_or("unknown", String::as_str)
    }

    /// Version for display, or `"0.0.0"`.
    #[must_use]
    pub fn display_version(&self) -> &str {
        self.version.present().map_or("0.0.0", String::as_str)
    }

    /// Requested capabilities, empty when the field is absent or malformed.
    #[must_use]
    pub fn requested_permissions(&self) -> &[String] {
        self.permissions.present().map_or(&[], Vec::as_slice)
    }
}

impl TryFrom<Value> for Manifest {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<Manifest> for Value {
    fn from(manifest: Manifest) -> Self {
        manifest.raw
    }
}

fn string(v: &Value) -> Option<String> {
    v.as_str().map(str::to_owned)
}

/// An array whose elements are all strings. Mixed arrays are malformed.
fn string_list(v: &Value) -> Option<Vec<String>> {
    v.as_array()?
        .iter()
        .map(|e| e.as_str().map(str::to_owned))
        .collect()
}

fn content_script(v: &Value) -> ContentScript {
    let Some(obj) = v.as_object() else {
        return ContentScript::default();
    };
    ContentScript {
        matches: Field::parse(obj.get("matches"), string_list),
        js: Field::parse(obj.get("js"), string_list),
        css: Field::parse(obj.get("css"), string_list),
    }
}

fn background(v: &Value) -> Option<Background> {
    let obj = v.as_object()?;
    Some(Background {
        scripts: Field::parse(obj.get("scripts"), string_list),
        page: Field::parse(obj.get("page"), string),
        service_worker: Field::parse(obj.get("service_worker"), string),
    })
}

fn web_accessible_resource(v: &Value) -> WebAccessibleResource {
    match v {
        Value::String(s) => WebAccessibleResource::Path(s.clone()),
        Value::Object(obj) => WebAccessibleResource::Rule {
            resources: Field::parse(obj.get("resources"), string_list),
            matches: Field::parse(obj.get("matches"), string_list),
        },
        other => WebAccessibleResource::Invalid {
            found: json_type(other),
        },
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let m = Manifest::from_slice(
            br#"{"name":"X","version":"1.0","manifest_version":3,"permissions":["storage"]}"#,
        )
        .unwrap();
        assert_eq!(m.name, Field::Present("X".to_owned()));
        assert_eq!(m.version, Field::Present("1.0".to_owned()));
        assert_eq!(m.schema_version, Field::Present(3));
        assert_eq!(m.requested_permissions(), ["storage".to_owned()]);
        assert_eq!(m.content_scripts, Field::Missing);
        assert_eq!(m.background, Field::Missing);
    }

    #[test]
    fn records_wrong_types_as_malformed() {
        let m = Manifest::from_slice(
            br#"{"name":5,"version":["1"],"manifest_version":"3","permissions":"storage"}"#,
        )
        .unwrap();
        assert_eq!(m.name, Field::Malformed { found: "number" });
        assert_eq!(m.version, Field::Malformed { found: "array" });
        assert_eq!(m.schema_version, Field::Malformed { found: "string" });
        assert_eq!(m.permissions, Field::Malformed { found: "string" });
        assert!(m.requested_permissions().is_empty());
        assert_eq!(m.display_name(), "unknown");
    }

    #[test]
    fn mixed_permission_array_is_malformed() {
        let m = Manifest::from_slice(br#"{"permissions":["storage", 7]}"#).unwrap();
        assert_eq!(m.permissions, Field::Malformed { found: "array" });
    }

    #[test]
    fn parses_nested_sections() {
        let m = Manifest::from_slice(
            br#"{
                "content_scripts": [{"matches": ["<all_urls>"], "js": ["a.js"]}, 3],
                "background": {"service_worker": "bg.js"},
                "web_accessible_resources": [
                    "img.png",
                    {"resources": ["x.css"], "matches": ["https://*/*"]},
                    false
                ]
            }"#,
        )
        .unwrap();

        let scripts = m.content_scripts.present().unwrap();
        assert_eq!(scripts.len(), 2);
        assert!(scripts[0].matches.is_present());
        assert!(scripts[0].js.is_present());
        assert_eq!(scripts[0].css, Field::Missing);
        assert_eq!(scripts[1], ContentScript::default());

        let bg = m.background.present().unwrap();
        assert_eq!(bg.service_worker, Field::Present("bg.js".to_owned()));

        let war = m.web_accessible_resources.present().unwrap();
        assert_eq!(war[0], WebAccessibleResource::Path("img.png".to_owned()));
        assert!(matches!(war[1], WebAccessibleResource::Rule { .. }));
        assert_eq!(war[2], WebAccessibleResource::Invalid { found: "boolean" });
    }

    #[test]
    fn rejects_non_object_and_bad_json() {
        assert!(matches!(
            Manifest::from_slice(b"[1,2]"),
            Err(CoreError::ManifestNotObject { found: "array" })
        ));
        assert!(matches!(
            Manifest::from_slice(b"{not json"),
            Err(CoreError::ManifestParse(_))
        ));
    }

    #[test]
    fn serde_round_trips_raw_document() {
        let m = Manifest::from_slice(br#"{"name":"X","custom":{"k":1}}"#).unwrap();
        let json = serde_json::to_string(&m).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.raw()["custom"]["k"], 1);
    }

    #[test]
    fn load_reads_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), br#"{"name":"On disk"}"#).unwrap();
        let m = Manifest::load(dir.path()).unwrap();
        assert_eq!(m.display_name(), "On disk");
    }
}
