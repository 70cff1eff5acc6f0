//! Gateway hook records.
//!
//! Mirrors the parts of the gateway's coprocess object this agent reads and
//! writes. Field names follow the protobuf schema so the JSON form matches the
//! gateway's own encoding. Fields not modelled here pass through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Metadata key holding the exchanged JWT between the two hooks.
pub const METADATA_PHANTOM_JWT: &str = "phantom_jwt";
/// Metadata key holding the original opaque token.
pub const METADATA_TOKEN: &str = "token";

/// Hook names dispatched by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookName {
    /// Custom auth check: exchange the opaque token.
    PhantomAuthCheck,
    /// Post key-auth: inject the JWT upstream.
    InjectJwtPostKeyAuth,
    /// Any other hook, passed through untouched.
    Unrecognized(String),
}

impl HookName {
    pub fn parse(name: &str) -> Self {
        match name {
            "PhantomAuthCheck" => HookName::PhantomAuthCheck,
            "InjectJwtPostKeyAuth" => HookName::InjectJwtPostKeyAuth,
            other => HookName::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            HookName::PhantomAuthCheck => "PhantomAuthCheck",
            HookName::InjectJwtPostKeyAuth => "InjectJwtPostKeyAuth",
            HookName::Unrecognized(name) => name,
        }
    }
}

impl std::fmt::Display for HookName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-request object exchanged with the gateway on every hook call.
///
/// Only the fields this agent touches are typed. Everything else the gateway
/// sends is kept in `extra` and written back as received, and typed fields the
/// gateway left out stay out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookObject {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hook_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<MiniRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionState>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HookObject {
    pub fn hook(&self) -> HookName {
        HookName::parse(&self.hook_name)
    }

    /// Inbound request header. An exact key match wins over a
    /// case-insensitive one.
    pub fn request_header(&self, name: &str) -> Option<&str> {
        let headers = self.request.as_ref()?.headers.as_ref()?;
        headers
            .get(name)
            .or_else(|| {
                headers
                    .iter()
                    .filter(|(k, _)| k.eq_ignore_ascii_case(name))
                    .min_by(|(a, _), (b, _)| a.cmp(b))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key).map(String::as_str)
    }

    pub fn metadata_mut(&mut self) -> &mut HashMap<String, String> {
        self.metadata.get_or_insert_with(HashMap::new)
    }

    pub fn request_mut(&mut self) -> &mut MiniRequest {
        self.request.get_or_insert_with(MiniRequest::default)
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        self.session.get_or_insert_with(SessionState::default)
    }
}

/// Request view given to hooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiniRequest {
    /// Inbound headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// Headers the gateway sets on the upstream request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_headers: Option<HashMap<String, String>>,
    /// Headers the gateway removes from the upstream request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_headers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Short-circuits the request when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_overrides: Option<ReturnOverrides>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MiniRequest {
    pub fn set_headers_mut(&mut self) -> &mut HashMap<String, String> {
        self.set_headers.get_or_insert_with(HashMap::new)
    }
}

/// Response the gateway sends instead of proxying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Session fields relevant to gateway-side rate limiting and quotas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_renewal_rate: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_extractor_deadline: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionState {
    /// Disable gateway-side limiting: rate 0, unlimited quota (-1).
    ///
    /// Limiting belongs to the identity provider and upstream services.
    /// Session fields outside the limiting set are left alone.
    pub fn reset_to_unlimited(&mut self) {
        self.rate = Some(0.0);
        self.per = Some(0.0);
        self.quota_max = Some(-1);
        self.quota_remaining = Some(-1);
        self.quota_renewal_rate = Some(0);
        self.last_updated = Some(String::new());
        self.id_extractor_deadline = Some(0);
    }
}
