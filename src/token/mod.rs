//! Token parsing helpers: bearer extraction and JWT expiry.

pub mod bearer;
pub mod expiry;

pub use bearer::extract_bearer;
pub use expiry::{is_compact, parse_jwt_expiry};
