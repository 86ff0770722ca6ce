//! Manifest validation against a [`SecurityPolicy`].
//!
//! [`validate`] is a pure function of the manifest, the policy, and the
//! current contents of the package directory. It never short-circuits: every
//! problem is collected so the caller can report them all at once.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use warden_core::{Field, MANIFEST_FILE_NAME, Manifest, WebAccessibleResource};

use crate::error::{PolicyError, PolicyResult};
use crate::policy::{PermissionClass, SecurityPolicy};
use crate::scan::scan_package;

/// A problem that blocks admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    /// A required field is absent.
    MissingField(&'static str),
    /// A field holds the wrong JSON type.
    WrongType {
        /// Manifest key.
        field: &'static str,
        /// Expected JSON type.
        expected: &'static str,
        /// JSON type found.
        found: &'static str,
    },
    /// `manifest_version` is not 2 or 3.
    UnsupportedSchemaVersion(u64),
    /// A content script without a non-empty `matches` list.
    ContentScriptMatches(usize),
    /// A content script with neither `js` nor `css` files.
    ContentScriptFiles(usize),
    /// A schema 3 web-accessible resource without `resources` and `matches`.
    WebAccessibleResource(usize),
    /// A capability on the blocked list.
    BlockedPermission(String),
    /// A capability on no list that is not a host pattern.
    UnknownPermission(String),
    /// Extracted size above the ceiling.
    PackageTooLarge {
        /// Bytes on disk.
        bytes: u64,
        /// Ceiling.
        limit: u64,
    },
    /// File count above the ceiling.
    TooManyFiles {
        /// Files on disk.
        count: u64,
        /// Ceiling.
        limit: u64,
    },
    /// Part of the package directory could not be read.
    Unreadable {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        message: String,
    },
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "{field} is required"),
            Self::WrongType {
                field,
                expected,
                found,
            } => write!(f, "{field} must be {expected}, found {found}"),
            Self::UnsupportedSchemaVersion(v) => {
                write!(f, "manifest_version must be 2 or 3, found {v}")
            },
            Self::ContentScriptMatches(i) => {
                write!(f, "content script {i} must have a non-empty matches array")
            },
            Self::ContentScriptFiles(i) => write!(f, "content script {i} must have js or css files"),
            Self::WebAccessibleResource(i) => {
                write!(f, "web accessible resource {i} must have resources and matches")
            },
            Self::BlockedPermission(p) => write!(f, "blocked permission: {p}"),
            Self::UnknownPermission(p) => write!(f, "unknown permission: {p}"),
            Self::PackageTooLarge { bytes, limit } => {
                write!(f, "package size ({bytes} bytes) exceeds maximum of {limit} bytes")
            },
            Self::TooManyFiles { count, limit } => {
                write!(f, "package has too many files ({count}), maximum is {limit}")
            },
            Self::Unreadable { path, message } => {
                write!(f, "cannot read {}: {message}", path.display())
            },
        }
    }
}

/// A problem that is reported but does not block admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyWarning {
    /// Schema 2 background without `scripts` or `page`.
    BackgroundWithoutScripts,
    /// Schema 3 background without `service_worker`.
    BackgroundWithoutServiceWorker,
    /// A file with a flagged extension.
    SuspiciousFile(PathBuf),
}

impl fmt::Display for PolicyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackgroundWithoutScripts => {
                f.write_str("background should specify scripts or page")
            },
            Self::BackgroundWithoutServiceWorker => {
                f.write_str("manifest v3 should use service_worker for background")
            },
            Self::SuspiciousFile(path) => {
                write!(f, "suspicious file type: {}", path.display())
            },
        }
    }
}

/// One requested capability and its class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedPermission {
    /// Capability name as requested.
    pub name: String,
    /// How the policy treats it.
    pub class: PermissionClass,
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// `errors.is_empty()`.
    pub valid: bool,
    /// Blocking problems, in check order.
    pub errors: Vec<PolicyViolation>,
    /// Non-blocking problems.
    pub warnings: Vec<PolicyWarning>,
    /// Every requested capability, in manifest order.
    pub classified: Vec<ClassifiedPermission>,
    /// Requested capabilities that need broker approval, in manifest order.
    pub escalation: Vec<String>,
}

impl ValidationResult {
    /// Errors rendered for display.
    #[must_use]
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Warnings rendered for display.
    #[must_use]
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}

/// Read `manifest.json` from `package_dir`, enforcing the manifest ceiling
/// before parsing.
///
/// # Errors
///
/// - [`PolicyError::MissingManifest`] if the file is absent
/// - [`PolicyError::ManifestTooLarge`] if it exceeds the ceiling
/// - [`PolicyError::InvalidManifest`] for invalid JSON or a non-object
pub fn read_manifest(package_dir: &Path, policy: &SecurityPolicy) -> PolicyResult<Manifest> {
    let path = package_dir.join(MANIFEST_FILE_NAME);
    let meta = match std::fs::metadata(&path) {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return Err(PolicyError::MissingManifest),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PolicyError::MissingManifest);
        },
        Err(e) => return Err(e.into()),
    };

    let limit = policy.limits().max_manifest_bytes;
    if meta.len() > limit {
        return Err(PolicyError::ManifestTooLarge {
            bytes: meta.len(),
            limit,
        });
    }

    let bytes = std::fs::read(&path)?;
    Manifest::from_slice(&bytes).map_err(|e| PolicyError::InvalidManifest(e.to_string()))
}

/// Validate `manifest` and the extracted package in `package_dir`.
#[must_use]
pub fn validate(
    manifest: &Manifest,
    package_dir: &Path,
    policy: &SecurityPolicy,
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    check_string(&manifest.name, "name", &mut errors);
    check_string(&manifest.version, "version", &mut errors);
    let schema = check_schema_version(&manifest.schema_version, &mut errors);

    let (classified, escalation) = classify_permissions(manifest, policy, &mut errors);
    check_content_scripts(manifest, &mut errors);
    check_background(manifest, schema, &mut warnings);
    check_web_accessible_resources(manifest, schema, &mut errors);

    let stats = scan_package(package_dir, policy);
    for (path, message) in stats.unreadable {
        errors.push(PolicyViolation::Unreadable { path, message });
    }
    let limits = policy.limits();
    if stats.total_bytes > limits.max_package_bytes {
        errors.push(PolicyViolation::PackageTooLarge {
            bytes: stats.total_bytes,
            limit: limits.max_package_bytes,
        });
    }
    if stats.file_count > limits.max_file_count {
        errors.push(PolicyViolation::TooManyFiles {
            count: stats.file_count,
            limit: limits.max_file_count,
        });
    }
    warnings.extend(stats.suspicious.into_iter().map(PolicyWarning::SuspiciousFile));

    for w in &warnings {
        warn!(package = manifest.display_name(), warning = %w, "Manifest warning");
    }
    debug!(
        package = manifest.display_name(),
        errors = errors.len(),
        warnings = warnings.len(),
        escalation = escalation.len(),
        "Validated manifest"
    );

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
        classified,
        escalation,
    }
}

fn check_string(field: &Field<String>, key: &'static str, errors: &mut Vec<PolicyViolation>) {
    match field {
        Field::Present(s) if !s.is_empty() => {},
        Field::Present(_) | Field::Missing => errors.push(PolicyViolation::MissingField(key)),
        Field::Malformed { found } => errors.push(PolicyViolation::WrongType {
            field: key,
            expected: "a string",
            found: *found,
        }),
    }
}

fn check_schema_version(field: &Field<u64>, errors: &mut Vec<PolicyViolation>) -> Option<u64> {
    match field {
        Field::Present(v @ (2 | 3)) => Some(*v),
        Field::Present(other) => {
            errors.push(PolicyViolation::UnsupportedSchemaVersion(*other));
            None
        },
        Field::Missing => {
            errors.push(PolicyViolation::MissingField("manifest_version"));
            None
        },
        Field::Malformed { found } => {
            errors.push(PolicyViolation::WrongType {
                field: "manifest_version",
                expected: "2 or 3",
                found: *found,
            });
            None
        },
    }
}

fn classify_permissions(
    manifest: &Manifest,
    policy: &SecurityPolicy,
    errors: &mut Vec<PolicyViolation>,
) -> (Vec<ClassifiedPermission>, Vec<String>) {
    if let Field::Malformed { found } = &manifest.permissions {
        errors.push(PolicyViolation::WrongType {
            field: "permissions",
            expected: "an array of strings",
            found: *found,
        });
    }

    let mut classified = Vec::new();
    let mut escalation = Vec::new();
    for name in manifest.requested_permissions() {
        let class = policy.classify(name);
        match class {
            PermissionClass::Blocked => {
                errors.push(PolicyViolation::BlockedPermission(name.clone()));
            },
            PermissionClass::Unknown => {
                errors.push(PolicyViolation::UnknownPermission(name.clone()));
            },
            PermissionClass::Escalation => {
                if !escalation.contains(name) {
                    escalation.push(name.clone());
                }
            },
            PermissionClass::Allowed | PermissionClass::Host => {},
        }
        classified.push(ClassifiedPermission {
            name: name.clone(),
            class,
        });
    }
    (classified, escalation)
}

fn non_empty(field: &Field<Vec<String>>) -> bool {
    field.present().is_some_and(|v| !v.is_empty())
}

fn check_content_scripts(manifest: &Manifest, errors: &mut Vec<PolicyViolation>) {
    match &manifest.content_scripts {
        Field::Missing => {},
        Field::Malformed { found } => errors.push(PolicyViolation::WrongType {
            field: "content_scripts",
            expected: "an array",
            found: *found,
        }),
        Field::Present(scripts) => {
            for (index, script) in scripts.iter().enumerate() {
                if !non_empty(&script.matches) {
                    errors.push(PolicyViolation::ContentScriptMatches(index));
                }
                if !non_empty(&script.js) && !non_empty(&script.css) {
                    errors.push(PolicyViolation::ContentScriptFiles(index));
                }
            }
        },
    }
}

fn check_background(manifest: &Manifest, schema: Option<u64>, warnings: &mut Vec<PolicyWarning>) {
    if !manifest.background.is_declared() {
        return;
    }
    let background = manifest.background.present();
    match schema {
        Some(2) => {
            let has_entry = background
                .is_some_and(|b| b.scripts.is_present() || b.page.is_present());
            if !has_entry {
                warnings.push(PolicyWarning::BackgroundWithoutScripts);
            }
        },
        Some(3) => {
            if !background.is_some_and(|b| b.service_worker.is_present()) {
                warnings.push(PolicyWarning::BackgroundWithoutServiceWorker);
            }
        },
        _ => {},
    }
}

fn check_web_accessible_resources(
    manifest: &Manifest,
    schema: Option<u64>,
    errors: &mut Vec<PolicyViolation>,
) {
    match &manifest.web_accessible_resources {
        Field::Missing => {},
        Field::Malformed { found } => errors.push(PolicyViolation::WrongType {
            field: "web_accessible_resources",
            expected: "an array",
            found: *found,
        }),
        Field::Present(entries) if schema == Some(3) => {
            for (index, entry) in entries.iter().enumerate() {
                let complete = matches!(
                    entry,
                    WebAccessibleResource::Rule { resources, matches }
                        if resources.is_present() && matches.is_present()
                );
                if !complete {
                    errors.push(PolicyViolation::WebAccessibleResource(index));
                }
            }
        },
        Field::Present(_) => {},
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::policy::ResourceLimits;

    fn manifest(value: serde_json::Value) -> Manifest {
        Manifest::from_value(value).unwrap()
    }

    fn package(manifest: &serde_json::Value) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE_NAME),
            serde_json::to_vec(manifest).unwrap(),
        )
        .unwrap();
        dir
    }

    fn check(value: serde_json::Value) -> ValidationResult {
        let dir = package(&value);
        validate(&manifest(value), dir.path(), &SecurityPolicy::default())
    }

    #[test]
    fn allowed_only_is_valid_without_escalation() {
        let result = check(json!({
            "name": "X", "version": "1.0", "manifest_version": 3,
            "permissions": ["storage", "tabs"]
        }));
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.escalation.is_empty());
        assert_eq!(result.classified.len(), 2);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn blocked_permission_is_named_in_an_error() {
        let result = check(json!({
            "name": "X", "version": "1.0", "manifest_version": 3,
            "permissions": ["system.cpu"]
        }));
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![PolicyViolation::BlockedPermission("system.cpu".into())]
        );
        assert!(result.error_messages()[0].contains("system.cpu"));
    }

    #[test]
    fn mixed_allowed_and_escalation_is_valid_with_escalation() {
        let result = check(json!({
            "name": "X", "version": "1.0", "manifest_version": 2,
            "permissions": ["storage", "webRequest", "https://*/*", "webRequest"]
        }));
        assert!(result.valid);
        assert_eq!(result.escalation, vec!["webRequest"]);
        assert_eq!(result.classified[2].class, PermissionClass::Host);
    }

    #[test]
    fn every_bad_permission_is_reported() {
        let result = check(json!({
            "name": "X", "version": "1.0", "manifest_version": 3,
            "permissions": ["usb", "clipboardRead", "storage", "serial"]
        }));
        assert_eq!(result.errors.len(), 3);
        assert!(matches!(&result.errors[1], PolicyViolation::UnknownPermission(p) if p == "clipboardRead"));
    }

    #[rstest]
    #[case::missing_name(json!({"version": "1", "manifest_version": 3}), PolicyViolation::MissingField("name"))]
    #[case::numeric_version(
        json!({"name": "X", "version": 1, "manifest_version": 3}),
        PolicyViolation::WrongType { field: "version", expected: "a string", found: "number" }
    )]
    #[case::schema_four(json!({"name": "X", "version": "1", "manifest_version": 4}), PolicyViolation::UnsupportedSchemaVersion(4))]
    #[case::schema_missing(json!({"name": "X", "version": "1"}), PolicyViolation::MissingField("manifest_version"))]
    #[case::permissions_object(
        json!({"name": "X", "version": "1", "manifest_version": 3, "permissions": {"a": 1}}),
        PolicyViolation::WrongType { field: "permissions", expected: "an array of strings", found: "object" }
    )]
    fn structural_errors(#[case] value: serde_json::Value, #[case] expected: PolicyViolation) {
        let result = check(value);
        assert!(!result.valid);
        assert_eq!(result.errors, vec![expected]);
    }

    #[test]
    fn content_scripts_need_matches_and_files() {
        let result = check(json!({
            "name": "X", "version": "1.0", "manifest_version": 3,
            "content_scripts": [
                {"matches": ["<all_urls>"], "js": ["a.js"]},
                {"matches": [], "css": ["a.css"]},
                {"matches": ["https://*/*"]},
                "nonsense"
            ]
        }));
        assert_eq!(
            result.errors,
            vec![
                PolicyViolation::ContentScriptMatches(1),
                PolicyViolation::ContentScriptFiles(2),
                PolicyViolation::ContentScriptMatches(3),
                PolicyViolation::ContentScriptFiles(3),
            ]
        );
    }

    #[test]
    fn background_shape_mismatch_is_only_a_warning() {
        let v3 = check(json!({
            "name": "X", "version": "1.0", "manifest_version": 3,
            "background": {"scripts": ["bg.js"]}
        }));
        assert!(v3.valid);
        assert_eq!(v3.warnings, vec![PolicyWarning::BackgroundWithoutServiceWorker]);

        let v2 = check(json!({
            "name": "X", "version": "1.0", "manifest_version": 2,
            "background": {"service_worker": "sw.js"}
        }));
        assert!(v2.valid);
        assert_eq!(v2.warnings, vec![PolicyWarning::BackgroundWithoutScripts]);
    }

    #[test]
    fn schema_three_resources_need_resources_and_matches() {
        let result = check(json!({
            "name": "X", "version": "1.0", "manifest_version": 3,
            "web_accessible_resources": [
                {"resources": ["img/*"], "matches": ["<all_urls>"]},
                {"resources": ["img/*"]},
                "legacy.png"
            ]
        }));
        assert_eq!(
            result.errors,
            vec![
                PolicyViolation::WebAccessibleResource(1),
                PolicyViolation::WebAccessibleResource(2),
            ]
        );

        let v2 = check(json!({
            "name": "X", "version": "1.0", "manifest_version": 2,
            "web_accessible_resources": ["legacy.png"]
        }));
        assert!(v2.valid);

        let not_array = check(json!({
            "name": "X", "version": "1.0", "manifest_version": 2,
            "web_accessible_resources": "legacy.png"
        }));
        assert!(!not_array.valid);
    }

    #[test]
    fn ceilings_are_checked_against_disk() {
        let value = json!({"name": "X", "version": "1.0", "manifest_version": 3});
        let dir = package(&value);
        std::fs::write(dir.path().join("a.bin"), [0u8; 200]).unwrap();
        std::fs::write(dir.path().join("b.bin"), [0u8; 200]).unwrap();

        let policy = SecurityPolicy::default().with_limits(ResourceLimits {
            max_package_bytes: 300,
            max_file_count: 2,
            max_manifest_bytes: 1024,
        });
        let result = validate(&manifest(value), dir.path(), &policy);
        assert!(!result.valid);
        assert!(matches!(result.errors[0], PolicyViolation::PackageTooLarge { limit: 300, .. }));
        assert_eq!(
            result.errors[1],
            PolicyViolation::TooManyFiles { count: 3, limit: 2 }
        );
    }

    #[test]
    fn suspicious_files_warn_without_invalidating() {
        let value = json!({"name": "X", "version": "1.0", "manifest_version": 3});
        let dir = package(&value);
        std::fs::write(dir.path().join("payload.dll"), b"MZ").unwrap();

        let result = validate(&manifest(value), dir.path(), &SecurityPolicy::default());
        assert!(result.valid);
        assert_eq!(
            result.warnings,
            vec![PolicyWarning::SuspiciousFile(PathBuf::from("payload.dll"))]
        );
    }

    #[test]
    fn validation_is_deterministic() {
        let value = json!({
            "name": "X", "version": "1.0", "manifest_version": 3,
            "permissions": ["usb", "proxy", "storage", "bogus"],
            "background": {}
        });
        let dir = package(&value);
        std::fs::write(dir.path().join("z.exe"), b"x").unwrap();
        std::fs::write(dir.path().join("a.so"), b"x").unwrap();
        let m = manifest(value);
        let policy = SecurityPolicy::default();

        let first = validate(&m, dir.path(), &policy);
        for _ in 0..5 {
            assert_eq!(validate(&m, dir.path(), &policy), first);
        }
    }

    #[test]
    fn read_manifest_enforces_presence_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let policy = SecurityPolicy::default().with_limits(ResourceLimits {
            max_manifest_bytes: 16,
            ..ResourceLimits::default()
        });
        assert!(matches!(
            read_manifest(dir.path(), &policy),
            Err(PolicyError::MissingManifest)
        ));

        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), b"{\"name\": \"a long name here\"}")
            .unwrap();
        assert!(matches!(
            read_manifest(dir.path(), &policy),
            Err(PolicyError::ManifestTooLarge { limit: 16, .. })
        ));

        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), b"{nope").unwrap();
        assert!(matches!(
            read_manifest(dir.path(), &policy),
            Err(PolicyError::InvalidManifest(_))
        ));

        std::fs::write(dir.path().join(MANIFEST_FILE_NAME), b"{\"name\":\"X\"}").unwrap();
        assert_eq!(
            read_manifest(dir.path(), &policy).unwrap().display_name(),
            "X"
        );
    }
}
