//! Stable identity for candidate items: SHA-256 over `title` immediately followed by `body`.
//!
//! The byte layout (no separator, title first) has to stay exactly as is. Ledgers written
//! by earlier runs contain digests produced this way, and changing it would re-alert
//! every item seen so far.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ingest::types::CandidateItem;

/// Lowercase hex SHA-256 digest. Used as a dedup key, not as an integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, enough to correlate log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(hex: String) -> Self {
        Self(hex)
    }
}

pub fn fingerprint(title: &str, body: &str) -> Fingerprint {
    use std::fmt::Write as _;

    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(body.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    Fingerprint(out)
}

/// Fingerprint of an item under the given link-body policy.
pub fn item_fingerprint(item: &CandidateItem, include_link_body: bool) -> Fingerprint {
    fingerprint(&item.title, item.effective_body(include_link_body))
}
