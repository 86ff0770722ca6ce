//! Package identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

/// Length of every package identifier.
pub const PACKAGE_ID_LEN: usize = 32;

/// Alphabet used when deriving an identifier from a digest: one letter per nibble.
const NIBBLE_ALPHABET: &[u8; 16] = b"abcdefghijklmnop";

/// Stable identifier of a catalog package.
///
/// Exactly 32 lowercase ASCII letters. Identifiers taken from user input are
/// lowercased before construction (see `warden_catalog::resolve_identifier`);
/// [`PackageId::new`] itself is strict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PackageId(String);

/// Deserialize with validation so a crafted record file cannot smuggle a
/// traversal payload in as a directory name.
impl<'de> Deserialize<'de> for PackageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl PackageId {
    /// Create a new `PackageId`, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidId`] unless the input is exactly 32
    /// lowercase ASCII letters.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Check whether a string is a valid package id without constructing one.
    #[must_use]
    pub fn is_valid_id(id: &str) -> bool {
        Self::validate(id).is_ok()
    }

    /// Derive an identifier from a container public key.
    ///
    /// SHA-256 of the key, first 16 bytes, each nibble mapped onto `a..=p`.
    #[must_use]
    pub fn from_public_key(key: &[u8]) -> Self {
        Self::from_digest(&Sha256::digest(key))
    }

    /// Derive an identifier from an arbitrary seed (used for local installs
    /// that carry no public key).
    #[must_use]
    pub fn from_seed(seed: &str) -> Self {
        Self::from_digest(&Sha256::digest(seed.as_bytes()))
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut out = String::with_capacity(PACKAGE_ID_LEN);
        for byte in digest.iter().take(PACKAGE_ID_LEN / 2) {
            out.push(char::from(NIBBLE_ALPHABET[usize::from(byte / 16)]));
            out.push(char::from(NIBBLE_ALPHABET[usize::from(byte % 16)]));
        }
        Self(out)
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> CoreResult<()> {
        if id.len() != PACKAGE_ID_LEN {
            return Err(CoreError::InvalidId(format!(
                "package id must be {PACKAGE_ID_LEN} characters, got {}: {id}",
                id.len()
            )));
        }
        if !id.bytes().all(|b| b.is_ascii_lowercase()) {
            return Err(CoreError::InvalidId(format!(
                "package id must contain only lowercase letters, got: {id}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for PackageId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "aapocclcgogkmnckokdopfmhonfmgoek";

    #[test]
    fn accepts_valid_id() {
        let id = PackageId::new(VALID).unwrap();
        assert_eq!(id.as_str(), VALID);
        assert_eq!(id.to_string(), VALID);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(PackageId::new("abc").is_err());
        assert!(PackageId::new(format!("{VALID}a")).is_err());
        assert!(PackageId::new("").is_err());
    }

    #[test]
    fn rejects_uppercase_and_digits() {
        assert!(PackageId::new(VALID.to_uppercase()).is_err());
        assert!(PackageId::new("aapocclcgogkmnckokdopfmhonfmgoe1").is_err());
        assert!(PackageId::new("aapocclcgogkmnckokdopfmhonfmgo/.").is_err());
    }

    #[test]
    fn derived_ids_are_valid_and_stable() {
        let a = PackageId::from_public_key(b"some public key bytes");
        let b = PackageId::from_public_key(b"some public key bytes");
        assert_eq!(a, b);
        assert!(PackageId::is_valid_id(a.as_str()));
        assert!(a.as_str().bytes().all(|c| (b'a'..=b'p').contains(&c)));

        let c = PackageId::from_seed("My Package/tmp/src");
        assert!(PackageId::is_valid_id(c.as_str()));
        assert_ne!(a, c);
    }

    #[test]
    fn deserialize_rejects_malformed() {
        let ok: PackageId = serde_json::from_str(&format!("\"{VALID}\"")).unwrap();
        assert_eq!(ok.as_str(), VALID);
        let bad: Result<PackageId, _> = serde_json::from_str("\"../../etc/passwd\"");
        assert!(bad.is_err());
    }
}
