//! JWT cache for exchanged phantom tokens.
//!
//! Maps the digest of an opaque token to the JWT obtained for it, bounded in
//! time by the token's own expiry and in size by a best-effort capacity limit
//! enforced from a background task.

pub mod janitor;
pub mod store;
pub mod types;

pub use janitor::DEFAULT_JANITOR_INTERVAL_SECS;
pub use store::JwtCache;
pub use types::CacheKey;
