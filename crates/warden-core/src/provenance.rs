//! Where an installed package came from.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Origin of an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Downloaded from the remote catalog.
    Catalog {
        /// The URL or bare id the user supplied.
        source: String,
    },
    /// Installed from a local directory or container file.
    Local {
        /// Path the package was read from.
        source_path: PathBuf,
    },
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog { source } => write!(f, "catalog:{source}"),
            Self::Local { source_path } => write!(f, "local:{}", source_path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let p = Provenance::Local {
            source_path: PathBuf::from("/tmp/pkg"),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["kind"], "local");
        assert_eq!(json["source_path"], "/tmp/pkg");

        let back: Provenance = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn display_prefixes_origin() {
        let p = Provenance::Catalog {
            source: "aapocclcgogkmnckokdopfmhonfmgoek".into(),
        };
        assert_eq!(p.to_string(), "catalog:aapocclcgogkmnckokdopfmhonfmgoek");
    }
}
