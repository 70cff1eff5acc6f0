//! Cache key, entry and clock types.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Cache key derived from an opaque access token (SHA-256, 32 bytes).
///
/// The derivation is one-way: the cache never holds the opaque token itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Derive the key for an opaque token.
    pub fn derive(opaque: &str) -> Self {
        Self(Sha256::digest(opaque.as_bytes()).into())
    }

    /// Lowercase hex form (64 chars).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix of the hex form, safe for log lines.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A cached JWT with the instant after which it must no longer be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// The JWT handed upstream.
    pub jwt: String,

    /// Effective deadline (token expiry minus clock skew).
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry is past its deadline at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
