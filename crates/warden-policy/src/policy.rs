//! The process-wide admission policy.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use warden_core::PackageId;

/// Default content security policy template for package pages.
pub const DEFAULT_CSP_TEMPLATE: &str =
    "default-src 'self'; script-src 'self'; object-src 'none'; style-src 'self' 'unsafe-inline';";

/// How the policy treats one requested capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionClass {
    /// Granted without approval.
    Allowed,
    /// Installable, but needs explicit approval before it is granted.
    Escalation,
    /// A host match pattern (`https://*/*`, `<all_urls>`).
    Host,
    /// Never installable.
    Blocked,
    /// Not on any list and not a host pattern. Not installable.
    Unknown,
}

impl PermissionClass {
    /// Whether a package requesting this capability may be admitted.
    #[must_use]
    pub fn is_admissible(self) -> bool {
        !matches!(self, Self::Blocked | Self::Unknown)
    }
}

impl fmt::Display for PermissionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allowed => "allowed",
            Self::Escalation => "escalation",
            Self::Host => "host",
            Self::Blocked => "blocked",
            Self::Unknown => "unknown",
        })
    }
}

/// Whether `capability` looks like a host match pattern.
#[must_use]
pub fn is_host_pattern(capability: &str) -> bool {
    capability.contains("://") || capability.starts_with("<all_urls>")
}

/// Size and count ceilings on an extracted package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Total bytes of all files.
    pub max_package_bytes: u64,
    /// Number of files.
    pub max_file_count: u64,
    /// Size of `manifest.json`.
    pub max_manifest_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_package_bytes: 52_428_800,
            max_file_count: 1000,
            max_manifest_bytes: 1_048_576,
        }
    }
}

/// Capability lists, ceilings and the CSP template.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityPolicy {
    allowed: BTreeSet<String>,
    escalation: BTreeSet<String>,
    blocked: BTreeSet<String>,
    csp_template: String,
    limits: ResourceLimits,
    suspicious_extensions: BTreeSet<String>,
}

fn to_set<I, S>(items: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::new(
            [
                "tabs",
                "storage",
                "contextMenus",
                "browserAction",
                "activeTab",
                "background",
                "notifications",
                "bookmarks",
                "history",
            ],
            [
                "webRequest",
                "webRequestBlocking",
                "proxy",
                "privacy",
                "management",
                "nativeMessaging",
                "debugger",
            ],
            [
                "experimental",
                "system.cpu",
                "system.memory",
                "system.storage",
                "fileSystem",
                "serial",
                "usb",
                "bluetooth",
            ],
        )
        .with_suspicious_extensions(["exe", "dll", "so", "dylib", "bat", "sh", "scr"])
    }
}

impl SecurityPolicy {
    /// Build a policy from the three capability lists, with default ceilings,
    /// the default CSP template and no suspicious extensions.
    #[must_use]
    pub fn new<A, E, B, S>(allowed: A, escalation: E, blocked: B) -> Self
    where
        A: IntoIterator<Item = S>,
        E: IntoIterator<Item = S>,
        B: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: to_set(allowed),
            escalation: to_set(escalation),
            blocked: to_set(blocked),
            csp_template: DEFAULT_CSP_TEMPLATE.to_owned(),
            limits: ResourceLimits::default(),
            suspicious_extensions: BTreeSet::new(),
        }
    }

    /// Replace the ceilings.
    #[must_use]
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the CSP template.
    #[must_use]
    pub fn with_csp_template(mut self, template: impl Into<String>) -> Self {
        self.csp_template = template.into();
        self
    }

    /// Replace the suspicious file extensions (without the leading dot,
    /// matched case-insensitively).
    #[must_use]
    pub fn with_suspicious_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suspicious_extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Classify one requested capability.
    ///
    /// Blocked wins over every other list.
    #[must_use]
    pub fn classify(&self, capability: &str) -> PermissionClass {
        if self.blocked.contains(capability) {
            PermissionClass::Blocked
        } else if self.allowed.contains(capability) {
            PermissionClass::Allowed
        } else if self.escalation.contains(capability) {
            PermissionClass::Escalation
        } else if is_host_pattern(capability) {
            PermissionClass::Host
        } else {
            PermissionClass::Unknown
        }
    }

    /// Whether `capability` needs broker approval.
    #[must_use]
    pub fn requires_escalation(&self, capability: &str) -> bool {
        self.classify(capability) == PermissionClass::Escalation
    }

    /// The CSP for pages of package `id`: the template with its first
    /// `'self'` widened to the package origin.
    #[must_use]
    pub fn content_security_policy(&self, id: &PackageId) -> String {
        self.csp_template
            .replacen("'self'", &format!("'self' chrome-extension://{id}"), 1)
    }

    /// Ceilings.
    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Whether `extension` (no dot) is flagged by the suspicious-file scan.
    #[must_use]
    pub fn is_suspicious_extension(&self, extension: &str) -> bool {
        self.suspicious_extensions
            .contains(&extension.to_ascii_lowercase())
    }

    /// Capabilities granted without approval.
    #[must_use]
    pub fn allowed(&self) -> &BTreeSet<String> {
        &self.allowed
    }

    /// Capabilities that need approval.
    #[must_use]
    pub fn escalation(&self) -> &BTreeSet<String> {
        &self.escalation
    }

    /// Capabilities that are never installable.
    #[must_use]
    pub fn blocked(&self) -> &BTreeSet<String> {
        &self.blocked
    }
}
