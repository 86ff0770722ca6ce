//! Featured catalog entries.

use serde::Serialize;

/// A featured catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PopularPackage {
    /// Package id.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Detail page.
    pub url: &'static str,
}

const POPULAR: &[PopularPackage] = &[
    PopularPackage {
        id: "cjpalhdlnbpafiamejdnhcphjbkeiagm",
        name: "uBlock Origin",
        description: "An efficient blocker. Easy on CPU and memory.",
        url: "https://chrome.google.com/webstore/detail/ublock-origin/cjpalhdlnbpafiamejdnhcphjbkeiagm",
    },
    PopularPackage {
        id: "nngceckbapebfimnlniiiahkandclblb",
        name: "Bitwarden",
        description: "A secure and free password manager for all of your devices.",
        url: "https://chrome.google.com/webstore/detail/bitwarden-free-password-m/nngceckbapebfimnlniiiahkandclblb",
    },
    PopularPackage {
        id: "bmnlcjabgnpnenekpadlanbbkooimhnj",
        name: "Honey",
        description: "Automatically find and apply coupon codes when you shop online!",
        url: "https://chrome.google.com/webstore/detail/honey/bmnlcjabgnpnenekpadlanbbkooimhnj",
    },
];

/// Static list of featured packages.
#[must_use]
pub fn popular_packages() -> &'static [PopularPackage] {
    POPULAR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve_identifier;

    #[test]
    fn every_entry_resolves_to_its_id() {
        for entry in popular_packages() {
            assert_eq!(resolve_identifier(entry.url).unwrap().as_str(), entry.id);
            assert_eq!(resolve_identifier(entry.id).unwrap().as_str(), entry.id);
        }
    }
}
