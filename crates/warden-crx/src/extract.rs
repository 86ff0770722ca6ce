//! Contained archive extraction.
//!
//! Every entry name is normalized lexically before anything touches the
//! filesystem. Entries that would land outside the output root (`..`
//! segments that climb past it, absolute paths, drive prefixes, backslash
//! separators used to hide either) are skipped with a warning and never
//! written. Symlink entries are skipped the same way. All other entries
//! are written, and any failure while writing one aborts the whole run.
//!
//! The output directory is left as-is on error; the caller owns it and is
//! expected to discard it.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{CrxError, CrxResult};

/// Unix file-type bits for a symbolic link.
const S_IFLNK: u32 = 0o120_000;
/// Mask for the unix file-type bits.
const S_IFMT: u32 = 0o170_000;

/// Hard ceilings applied while extracting, independent of admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    /// Maximum number of archive entries.
    pub max_entries: usize,
    /// Maximum number of decompressed bytes across all entries.
    pub max_total_bytes: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_total_bytes: 500_000_000,
        }
    }
}

/// Why an entry was not extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// `..` segments climb above the output root.
    Traversal,
    /// Rooted path or drive prefix.
    Absolute,
    /// Symbolic link entry.
    Symlink,
    /// NUL byte in the name.
    InvalidName,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Traversal => "path escapes the output root",
            Self::Absolute => "absolute path",
            Self::Symlink => "symbolic link",
            Self::InvalidName => "invalid entry name",
        })
    }
}

/// An entry that was not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Name as stored in the archive.
    pub name: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

impl fmt::Display for SkippedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "skipped archive entry {:?}: {}", self.name, self.reason)
    }
}

/// Outcome of a completed extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Files written.
    pub files: usize,
    /// Directory entries created.
    pub directories: usize,
    /// Decompressed bytes written.
    pub bytes: u64,
    /// Entries refused by the containment rules.
    pub skipped: Vec<SkippedEntry>,
}

impl ExtractReport {
    /// Human-readable warnings, one per skipped entry.
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.skipped.iter().map(ToString::to_string).collect()
    }
}

/// Normalize an archive entry name into a path relative to the output root.
///
/// Backslashes are treated as separators. `.` and empty segments are dropped
/// and `..` removes the previous segment. Returns `Ok(None)` when the name
/// normalizes to the root itself.
///
/// # Errors
///
/// Returns the [`SkipReason`] when the name is absolute, carries a drive
/// prefix, contains NUL, or climbs above the root.
pub fn contained_path(name: &str) -> Result<Option<PathBuf>, SkipReason> {
    if name.contains('\0') {
        return Err(SkipReason::InvalidName);
    }
    let unified = name.replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(SkipReason::Absolute);
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    return Err(SkipReason::Traversal);
                }
            },
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Ok(None);
    }
    let path: PathBuf = segments.iter().collect();
    // The platform parser must agree that every component is a plain name.
    if path.components().all(|c| matches!(c, Component::Normal(_))) {
        Ok(Some(path))
    } else {
        Err(SkipReason::Absolute)
    }
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn is_symlink(mode: Option<u32>) -> bool {
    mode.is_some_and(|m| m & S_IFMT == S_IFLNK)
}

/// Extract `payload` (a zip archive) into `output_root`.
///
/// `output_root` is created if missing. `cancel` is checked before every
/// entry. The function returns only after every entry has been written or
/// skipped.
///
/// # Errors
///
/// - [`CrxError::Archive`] if the archive or an entry is corrupt
/// - [`CrxError::LimitExceeded`] if `limits` are exceeded
/// - [`CrxError::Cancelled`] if `cancel` fires
/// - [`CrxError::Io`] if an entry cannot be written
pub fn extract_archive(
    payload: &[u8],
    output_root: &Path,
    limits: ExtractLimits,
    cancel: &CancellationToken,
) -> CrxResult<ExtractReport> {
    let mut archive = ZipArchive::new(Cursor::new(payload))?;
    if archive.len() > limits.max_entries {
        return Err(CrxError::LimitExceeded(format!(
            "{} entries, maximum is {}",
            archive.len(),
            limits.max_entries
        )));
    }

    fs::create_dir_all(output_root)?;
    let mut report = ExtractReport::default();

    for index in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(CrxError::Cancelled);
        }

        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_owned();

        if is_symlink(entry.unix_mode()) {
            skip(&mut report, name, SkipReason::Symlink);
            continue;
        }

        let relative = match contained_path(&name) {
            Ok(Some(path)) => path,
            Ok(None) => continue,
            Err(reason) => {
                skip(&mut report, name, reason);
                continue;
            },
        };
        let target = output_root.join(&relative);

        if name.ends_with('/') || name.ends_with('\\') {
            fs::create_dir_all(&target)?;
            report.directories = report.directories.saturating_add(1);
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let remaining = limits.max_total_bytes.saturating_sub(report.bytes);
        let mut out = File::create(&target)?;
        let written = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut out)
            .map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                    CrxError::Archive(format!("{name}: {e}"))
                },
                _ => CrxError::Io(e),
            })?;
        if written > remaining {
            return Err(CrxError::LimitExceeded(format!(
                "more than {} decompressed bytes",
                limits.max_total_bytes
            )));
        }

        report.bytes = report.bytes.saturating_add(written);
        report.files = report.files.saturating_add(1);
        debug!(entry = %relative.display(), bytes = written, "Extracted entry");
    }

    debug!(
        files = report.files,
        directories = report.directories,
        skipped = report.skipped.len(),
        "Extraction complete"
    );
    Ok(report)
}

fn skip(report: &mut ExtractReport, name: String, reason: SkipReason) {
    warn!(entry = %name, %reason, "Skipping archive entry");
    report.skipped.push(SkippedEntry { name, reason });
}
