//! Version tokens and stored values.

use bytes::Bytes;
use std::fmt;

/// Opaque token identifying one stored revision of a key.
///
/// Tokens are only ever compared for equality by Mailroom; the ordering is
/// exposed for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionToken(pub u64);

impl VersionToken {
    /// Creates a new version token.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Returns the raw token value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Raw bytes stored under a key together with their version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    /// Raw stored representation.
    pub raw: Bytes,
    /// Version of this revision.
    pub version: VersionToken,
}

impl StoredValue {
    /// Creates a stored value.
    pub fn new(raw: impl Into<Bytes>, version: VersionToken) -> Self {
        Self {
            raw: raw.into(),
            version,
        }
    }
}
