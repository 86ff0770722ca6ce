//! The enabled-set sidecar: an ordered JSON array of ids, rewritten whole.

use std::io::{ErrorKind, Write};
use std::path::Path;

use tracing::warn;
use warden_core::PackageId;

/// Read the enabled list. A missing file is an empty list; unparsable
/// content and invalid ids are dropped with a warning.
pub(crate) fn read(path: &Path) -> std::io::Result<Vec<PackageId>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let raw: Vec<String> = match serde_json::from_slice(&bytes) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable enabled list");
            return Ok(Vec::new());
        },
    };

    let mut ids: Vec<PackageId> = Vec::with_capacity(raw.len());
    for entry in raw {
        match PackageId::new(entry.as_str()) {
            Ok(id) if !ids.contains(&id) => ids.push(id),
            Ok(_) => {},
            Err(_) => warn!(entry = %entry, "Dropping invalid id from enabled list"),
        }
    }
    Ok(ids)
}

/// Replace the sidecar with `ids` via temp file and rename.
pub(crate) fn write(path: &Path, ids: &[PackageId]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let body = serde_json::to_vec_pretty(ids).map_err(std::io::Error::other)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".enabled")
        .tempfile_in(dir)?;
    tmp.write_all(&body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
