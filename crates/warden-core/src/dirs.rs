//! Directory layout of the warden home.
//!
//! # Layout
//!
//! ```text
//! ~/.warden/                      (WardenHome)
//! ├── packages/
//! │   └── <package-id>/             (extracted manifest and assets)
//! ├── enabled.json                  (ordered list of enabled ids)
//! ├── state/                        (key-value store: records, pending requests)
//! ├── tmp/                          (download and staging directories)
//! ├── logs/
//! └── config.toml                   (user config)
//! ```
//!
//! `tmp/` lives under the same root as `packages/` so staged extractions can be
//! moved into place with a rename.

use std::io;
use std::path::{Path, PathBuf};

use crate::id::PackageId;

/// Global warden home directory (`~/.warden/` or `$WARDEN_HOME`).
#[derive(Debug, Clone)]
pub struct WardenHome {
    root: PathBuf,
}

impl WardenHome {
    /// Resolve the home directory.
    ///
    /// Checks `$WARDEN_HOME` first, then falls back to `$HOME/.warden/`.
    ///
    /// # Errors
    ///
    /// Returns an error if `$WARDEN_HOME` is relative, or if neither variable
    /// is set.
    pub fn resolve() -> io::Result<Self> {
        let root = if let Ok(custom) = std::env::var("WARDEN_HOME") {
            let p = PathBuf::from(&custom);
            if !p.is_absolute() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "WARDEN_HOME must be an absolute path",
                ));
            }
            p
        } else {
            let home = std::env::var("HOME").map_err(|_| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "neither WARDEN_HOME nor HOME environment variable is set",
                )
            })?;
            PathBuf::from(home).join(".warden")
        };

        Ok(Self { root })
    }

    /// Create from an explicit path (useful for testing).
    #[must_use]
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ensure the directory structure exists.
    ///
    /// On Unix the root is restricted to `0o700`.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation or permission setting fails.
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.packages_dir())?;
        std::fs::create_dir_all(self.state_dir())?;
        std::fs::create_dir_all(self.tmp_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(self.root(), std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    /// Root directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Installed packages directory (`~/.warden/packages/`).
    #[must_use]
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    /// Directory of a single installed package.
    #[must_use]
    pub fn package_dir(&self, id: &PackageId) -> PathBuf {
        self.packages_dir().join(id.as_str())
    }

    /// Sidecar file holding the ordered enabled-id list.
    #[must_use]
    pub fn enabled_path(&self) -> PathBuf {
        self.root.join("enabled.json")
    }

    /// Key-value state directory (`~/.warden/state/`).
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Scratch directory for downloads and staged extractions.
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Logs directory (`~/.warden/logs/`).
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Path to the user configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }
}
