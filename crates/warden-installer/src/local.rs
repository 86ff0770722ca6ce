//! Helpers for installing from the local filesystem.

use std::io;
use std::path::Path;

use warden_core::PackageId;

/// Recursively copy an unpacked package into staging.
///
/// Symlinks are rejected outright; a package source must be a plain tree.
pub(crate) fn copy_package_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if file_type.is_symlink() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "package source contains a symlink at {}, which is not allowed",
                    src_path.display()
                ),
            ));
        }

        if file_type.is_dir() {
            copy_package_dir(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Refuse a source directory that contains the warden home; copying it
/// would recurse into its own staging area.
pub(crate) fn ensure_outside_home(src: &Path, home_root: &Path) -> io::Result<()> {
    let home = std::fs::canonicalize(home_root).unwrap_or_else(|_| home_root.to_path_buf());
    if home.starts_with(src) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "package source {} contains the warden home {}",
                src.display(),
                home.display()
            ),
        ));
    }
    Ok(())
}

/// Id for a package that carries no public key: derived from its manifest
/// name and where it was installed from, so the same source always maps to
/// the same id.
pub(crate) fn local_package_id(manifest_name: &str, canonical_source: &Path) -> PackageId {
    PackageId::from_seed(&format!("{manifest_name}{}", canonical_source.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_nested_tree() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("a/b")).unwrap();
        std::fs::write(src.path().join("manifest.json"), "{}").unwrap();
        std::fs::write(src.path().join("a/b/c.js"), "x").unwrap();

        let dst = tempfile::tempdir().unwrap();
        let out = dst.path().join("pkg");
        copy_package_dir(src.path(), &out).unwrap();

        assert!(out.join("manifest.json").is_file());
        assert_eq!(std::fs::read_to_string(out.join("a/b/c.js")).unwrap(), "x");
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlinks() {
        let src = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink("/etc/passwd", src.path().join("leak")).unwrap();

        let dst = tempfile::tempdir().unwrap();
        let err = copy_package_dir(src.path(), &dst.path().join("pkg")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("symlink"));
    }

    #[test]
    fn source_containing_the_home_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let src = std::fs::canonicalize(root.path()).unwrap();
        let home = src.join("nested").join(".warden");
        std::fs::create_dir_all(&home).unwrap();

        let err = ensure_outside_home(&src, &home).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("warden home"));
        assert!(ensure_outside_home(&home, &home).is_err());

        let sibling = src.join("pkg");
        std::fs::create_dir_all(&sibling).unwrap();
        assert!(ensure_outside_home(&sibling, &home).is_ok());
    }

    #[test]
    fn local_ids_are_stable_per_source() {
        let a = local_package_id("Demo", Path::new("/src/demo"));
        assert_eq!(a, local_package_id("Demo", Path::new("/src/demo")));
        assert_ne!(a, local_package_id("Demo", Path::new("/src/other")));
        assert_ne!(a, local_package_id("Other", Path::new("/src/demo")));
        assert!(PackageId::is_valid_id(a.as_str()));
    }
}
