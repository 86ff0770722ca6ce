//! Container header parsing.
//!
//! Two historical layouts share a common prefix. All integers are
//! little-endian `u32`.
//!
//! ```text
//! v2: "Cr24" | version=2 | key_len | sig_len | public key | signature | zip
//! v3: "Cr24" | version=3 | header_len | header (protobuf)  | zip
//! ```
//!
//! The parser only locates the payload. It never verifies the v2 signature
//! and never decodes the v3 protobuf header.

use std::ops::Range;
use std::path::Path;

use tracing::debug;

use crate::error::{CrxError, CrxResult};

/// Magic tag at offset 0 of every container.
pub const MAGIC: [u8; 4] = *b"Cr24";

/// Fields that depend on the format version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionFields {
    /// Version 2: an embedded public key and signature.
    V2 {
        /// Byte range of the DER public key.
        public_key: Range<usize>,
        /// Byte range of the signature.
        signature: Range<usize>,
    },
    /// Version 3: an opaque length-prefixed header.
    V3 {
        /// Declared header length.
        header_length: u32,
    },
}

/// Parsed container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Always [`MAGIC`] for a parsed header.
    pub magic: [u8; 4],
    /// Declared format version.
    pub format_version: u32,
    /// Version-specific layout.
    pub fields: VersionFields,
    /// Byte offset of the embedded archive.
    pub payload_offset: usize,
    /// Length of the embedded archive (`file length - payload_offset`).
    pub payload_length: usize,
}

fn read_u32_le(bytes: &[u8], at: usize) -> Option<u32> {
    let end = at.checked_add(4)?;
    let chunk: [u8; 4] = bytes.get(at..end)?.try_into().ok()?;
    Some(u32::from_le_bytes(chunk))
}

fn truncated(offset: u64, bytes: &[u8]) -> CrxError {
    CrxError::TruncatedHeader {
        offset,
        length: bytes.len() as u64,
    }
}

impl ContainerHeader {
    /// Parse the header at the start of `bytes`.
    ///
    /// # Errors
    ///
    /// - [`CrxError::InvalidMagic`] if the first four bytes are not `Cr24`
    /// - [`CrxError::UnsupportedVersion`] for any version other than 2 or 3
    /// - [`CrxError::TruncatedHeader`] if the fixed fields are cut short or the
    ///   computed payload offset is not below the file length
    pub fn parse(bytes: &[u8]) -> CrxResult<Self> {
        if bytes.get(..4) != Some(&MAGIC[..]) {
            return Err(CrxError::InvalidMagic);
        }

        let format_version = read_u32_le(bytes, 4).ok_or_else(|| truncated(8, bytes))?;

        let (fields, offset) = match format_version {
            3 => {
                let header_length = read_u32_le(bytes, 8).ok_or_else(|| truncated(12, bytes))?;
                (
                    VersionFields::V3 { header_length },
                    12u64.saturating_add(u64::from(header_length)),
                )
            },
            2 => {
                let key_len = read_u32_le(bytes, 8).ok_or_else(|| truncated(16, bytes))?;
                let sig_len = read_u32_le(bytes, 12).ok_or_else(|| truncated(16, bytes))?;
                let offset = 16u64
                    .saturating_add(u64::from(key_len))
                    .saturating_add(u64::from(sig_len));
                // Both ranges lie below `offset`, which is checked against the
                // file length before they are used.
                let key_end = 16usize.saturating_add(key_len as usize);
                let sig_end = key_end.saturating_add(sig_len as usize);
                (
                    VersionFields::V2 {
                        public_key: 16..key_end,
                        signature: key_end..sig_end,
                    },
                    offset,
                )
            },
            other => return Err(CrxError::UnsupportedVersion(other)),
        };

        let length = bytes.len() as u64;
        if offset >= length {
            return Err(truncated(offset, bytes));
        }
        let payload_offset = usize::try_from(offset).map_err(|_| truncated(offset, bytes))?;
        let payload_length = bytes.len().saturating_sub(payload_offset);

        debug!(
            format_version,
            payload_offset, payload_length, "Parsed container header"
        );

        Ok(Self {
            magic: MAGIC,
            format_version,
            fields,
            payload_offset,
            payload_length,
        })
    }

    /// The archive bytes of the container this header was parsed from.
    #[must_use]
    pub fn payload<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        bytes.get(self.payload_offset..).unwrap_or_default()
    }

    /// The embedded public key (version 2 only).
    #[must_use]
    pub fn public_key<'a>(&self, bytes: &'a [u8]) -> Option<&'a [u8]> {
        match &self.fields {
            VersionFields::V2 { public_key, .. } => bytes.get(public_key.clone()),
            VersionFields::V3 { .. } => None,
        }
    }

    /// The embedded signature (version 2 only). Never verified.
    #[must_use]
    pub fn signature<'a>(&self, bytes: &'a [u8]) -> Option<&'a [u8]> {
        match &self.fields {
            VersionFields::V2 { signature, .. } => bytes.get(signature.clone()),
            VersionFields::V3 { .. } => None,
        }
    }
}

/// A container held in memory together with its parsed header.
#[derive(Debug, Clone)]
pub struct Container {
    bytes: Vec<u8>,
    header: ContainerHeader,
}

impl Container {
    /// Parse an in-memory container.
    ///
    /// # Errors
    ///
    /// Returns the header errors of [`ContainerHeader::parse`].
    pub fn from_bytes(bytes: Vec<u8>) -> CrxResult<Self> {
        let header = ContainerHeader::parse(&bytes)?;
        Ok(Self { bytes, header })
    }

    /// Read and parse a container file.
    ///
    /// # Errors
    ///
    /// Returns [`CrxError::Io`] if the file cannot be read, or a header error.
    pub fn read(path: &Path) -> CrxResult<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// The parsed header.
    #[must_use]
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// The embedded archive bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.header.payload(&self.bytes)
    }

    /// The v2 public key, if any.
    #[must_use]
    pub fn public_key(&self) -> Option<&[u8]> {
        self.header.public_key(&self.bytes)
    }

    /// The v2 signature, if any.
    #[must_use]
    pub fn signature(&self) -> Option<&[u8]> {
        self.header.signature(&self.bytes)
    }

    /// Total container length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false for a parsed container, which holds at least one
    /// payload byte.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn v3(header_len: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend(std::iter::repeat_n(0xAB, header_len as usize));
        out.extend_from_slice(payload);
        out
    }

    fn v2(key: &[u8], sig: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&u32::try_from(key.len()).unwrap().to_le_bytes());
        out.extend_from_slice(&u32::try_from(sig.len()).unwrap().to_le_bytes());
        out.extend_from_slice(key);
        out.extend_from_slice(sig);
        out.extend_from_slice(payload);
        out
    }

    #[rstest]
    #[case::empty(b"")]
    #[case::short(b"Cr")]
    #[case::zip_magic(b"PK\x03\x04\x03\x00\x00\x00\x00\x00\x00\x00payload")]
    #[case::lowercase(b"cr24\x03\x00\x00\x00\x00\x00\x00\x00payload")]
    fn rejects_bad_magic(#[case] bytes: &[u8]) {
        assert!(matches!(
            ContainerHeader::parse(bytes),
            Err(CrxError::InvalidMagic)
        ));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(4)]
    #[case(0xFFFF_FFFF)]
    fn rejects_unknown_versions(#[case] version: u32) {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.extend_from_slice(&[0; 16]);
        assert!(matches!(
            ContainerHeader::parse(&bytes),
            Err(CrxError::UnsupportedVersion(v)) if v == version
        ));
    }

    #[rstest]
    #[case(0)]
    #[case(7)]
    #[case(512)]
    fn v3_offset_is_twelve_plus_header(#[case] header_len: u32) {
        let bytes = v3(header_len, b"PK-payload");
        let header = ContainerHeader::parse(&bytes).unwrap();
        assert_eq!(header.format_version, 3);
        assert_eq!(header.payload_offset, 12 + header_len as usize);
        assert_eq!(header.payload_length, 10);
        assert_eq!(header.payload(&bytes), b"PK-payload");
        assert!(header.public_key(&bytes).is_none());
    }

    #[test]
    fn v2_offset_covers_key_and_signature() {
        let bytes = v2(b"KEYBYTES", b"SIG", b"zip!");
        let header = ContainerHeader::parse(&bytes).unwrap();
        assert_eq!(header.payload_offset, 16 + 8 + 3);
        assert_eq!(header.payload(&bytes), b"zip!");
        assert_eq!(header.public_key(&bytes), Some(&b"KEYBYTES"[..]));
        assert_eq!(header.signature(&bytes), Some(&b"SIG"[..]));
    }

    #[test]
    fn offset_at_end_of_file_is_truncated() {
        let bytes = v3(4, b"");
        assert!(matches!(
            ContainerHeader::parse(&bytes),
            Err(CrxError::TruncatedHeader { offset: 16, length: 16 })
        ));

        let bytes = v2(b"key", b"sig", b"");
        assert!(matches!(
            ContainerHeader::parse(&bytes),
            Err(CrxError::TruncatedHeader { offset: 22, length: 22 })
        ));
    }

    #[test]
    fn huge_declared_lengths_are_truncated_not_panics() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(b"payload");
        assert!(matches!(
            ContainerHeader::parse(&bytes),
            Err(CrxError::TruncatedHeader { .. })
        ));
    }

    #[test]
    fn missing_fixed_fields_are_truncated() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&3u32.to_le_bytes());
        assert!(matches!(
            ContainerHeader::parse(&bytes),
            Err(CrxError::TruncatedHeader { .. })
        ));
        assert!(matches!(
            ContainerHeader::parse(b"Cr24\x02"),
            Err(CrxError::TruncatedHeader { .. })
        ));
    }

    #[test]
    fn container_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.crx");
        std::fs::write(&path, v3(0, b"archive")).unwrap();

        let container = Container::read(&path).unwrap();
        assert_eq!(container.payload(), b"archive");
        assert_eq!(container.len(), 19);
        assert!(!container.is_empty());
        assert!(container.signature().is_none());
    }
}
