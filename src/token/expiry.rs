//! Expiry extraction from compact JWTs.
//!
//! The signature is not checked here: the JWT came straight from the
//! introspection endpoint over an authenticated channel, and the upstream
//! service verifies it. Only the `exp` claim is read.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why the expiry of a token could not be read.
#[derive(Debug, Error)]
pub enum ExpiryError {
    #[error("not a compact JWS")]
    NotCompact,

    #[error("payload b64 decode: {0}")]
    PayloadEncoding(#[from] base64::DecodeError),

    #[error("payload json: {0}")]
    PayloadJson(#[from] serde_json::Error),

    #[error("no exp claim")]
    MissingExp,

    #[error("exp type unsupported")]
    UnsupportedExpType,

    #[error("exp out of range: {0}")]
    OutOfRange(i64),
}

/// The `exp` claim as it appeared in the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpClaim {
    /// JSON number, e.g. `1700000000`.
    Number(i64),
    /// Numeric string, e.g. `"1700000000"`.
    NumericText(i64),
    /// Anything else.
    Unsupported,
}

impl ExpClaim {
    /// Classify a raw claim value.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
                .map(ExpClaim::Number)
                .unwrap_or(ExpClaim::Unsupported),
            Value::String(s) => parse_numeric_text(s.trim())
                .map(ExpClaim::NumericText)
                .unwrap_or(ExpClaim::Unsupported),
            _ => ExpClaim::Unsupported,
        }
    }

    /// Unix seconds, if the claim is usable.
    pub fn unix_seconds(&self) -> Option<i64> {
        match self {
            ExpClaim::Number(secs) | ExpClaim::NumericText(secs) => Some(*secs),
            ExpClaim::Unsupported => None,
        }
    }
}

fn parse_numeric_text(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f as i64)
    })
}

/// Whether `token` has the three-segment compact shape.
pub fn is_compact(token: &str) -> bool {
    token.split('.').count() == 3
}

/// Read the `exp` claim of a compact JWT.
pub fn parse_jwt_expiry(token: &str) -> Result<DateTime<Utc>, ExpiryError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(ExpiryError::NotCompact);
    }

    let payload = URL_SAFE_NO_PAD.decode(parts[1])?;
    let claims: Map<String, Value> = serde_json::from_slice(&payload)?;

    let exp = claims.get("exp").ok_or(ExpiryError::MissingExp)?;
    let secs = ExpClaim::from_value(exp)
        .unix_seconds()
        .ok_or(ExpiryError::UnsupportedExpType)?;

    DateTime::from_timestamp(secs, 0).ok_or(ExpiryError::OutOfRange(secs))
}
