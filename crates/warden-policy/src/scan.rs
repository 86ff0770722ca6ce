//! On-disk package statistics.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::policy::SecurityPolicy;

/// What a recursive walk of a package directory found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageStats {
    /// Sum of regular file sizes.
    pub total_bytes: u64,
    /// Number of regular files.
    pub file_count: u64,
    /// Files with a suspicious extension, relative to the package root.
    pub suspicious: Vec<PathBuf>,
    /// Paths that could not be read, with the reason.
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Walk `dir` without following links, in file-name order.
#[must_use]
pub fn scan_package(dir: &Path, policy: &SecurityPolicy) -> PackageStats {
    let mut stats = PackageStats::default();

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(dir).to_path_buf();
                stats.unreadable.push((path, e.to_string()));
                continue;
            },
        };
        if !entry.file_type().is_file() {
            continue;
        }

        match entry.metadata() {
            Ok(meta) => stats.total_bytes = stats.total_bytes.saturating_add(meta.len()),
            Err(e) => {
                stats
                    .unreadable
                    .push((entry.path().to_path_buf(), e.to_string()));
                continue;
            },
        }
        stats.file_count = stats.file_count.saturating_add(1);

        let flagged = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| policy.is_suspicious_extension(e));
        if flagged {
            let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
            stats.suspicious.push(relative.to_path_buf());
        }
    }

    stats
}
