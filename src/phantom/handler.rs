//! Phantom token hooks.
//!
//! `PhantomAuthCheck` turns the inbound opaque token into a JWT (cache first,
//! introspection on miss). `InjectJwtPostKeyAuth` then replaces the upstream
//! `Authorization` header with that JWT. Every outcome is expressed in the
//! returned hook object; nothing here fails the dispatch itself.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{
    HookName, HookObject, ReturnOverrides, METADATA_PHANTOM_JWT, METADATA_TOKEN,
};
use crate::cache::{CacheKey, JwtCache};
use crate::introspection::{IntrospectionError, IntrospectionOutcome, Introspector};
use crate::token::extract_bearer;

pub const MISSING_BEARER: &str = "Missing bearer token";
pub const TOKEN_INACTIVE: &str = "Token inactive or invalid";
pub const JWT_MISSING_POST_AUTH: &str = "JWT missing post-auth";

/// Challenge sent with every rejection.
pub const WWW_AUTHENTICATE_INVALID_TOKEN: &str = r#"Bearer error="invalid_token""#;

/// Entry point the transport calls for each hook invocation.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, object: HookObject) -> HookObject;
}

/// Phantom token agent.
pub struct PhantomAgent {
    cache: Arc<JwtCache>,
    introspector: Arc<dyn Introspector>,
}

impl PhantomAgent {
    pub fn new(cache: Arc<JwtCache>, introspector: Arc<dyn Introspector>) -> Self {
        Self {
            cache,
            introspector,
        }
    }

    /// Phase 1: exchange the opaque bearer token for a JWT.
    pub async fn auth_check(&self, mut object: HookObject) -> HookObject {
        let opaque = object
            .request_header("Authorization")
            .and_then(extract_bearer)
            .map(str::to_string);
        let Some(opaque) = opaque else {
            debug!("No bearer token on request");
            return unauthorized(object, MISSING_BEARER);
        };

        let key = CacheKey::derive(&opaque);
        if let Some(jwt) = self.cache.get(&key) {
            debug!(key = %key.fingerprint(), "JWT cache hit");
            accept(&mut object, jwt, opaque);
            return object;
        }

        debug!(key = %key.fingerprint(), "JWT cache miss, introspecting");
        match self.introspector.introspect(&opaque).await {
            Ok(IntrospectionOutcome::Active(phantom)) => {
                let store_until = phantom
                    .expires_at
                    .checked_sub_signed(self.cache.clock_skew());
                let cached = self
                    .cache
                    .set(key, phantom.jwt.clone(), phantom.expires_at);
                info!(
                    key = %key.fingerprint(),
                    store_until = ?store_until,
                    cached,
                    "Exchanged opaque token for JWT"
                );
                accept(&mut object, phantom.jwt, opaque);
                object
            }
            Ok(IntrospectionOutcome::Inactive) => {
                info!(key = %key.fingerprint(), "Token inactive or invalid");
                unauthorized(object, TOKEN_INACTIVE)
            }
            Err(e) => {
                match &e {
                    IntrospectionError::Transport(_) => warn!(
                        key = %key.fingerprint(),
                        error = %e,
                        "Introspection request failed"
                    ),
                    IntrospectionError::Status { status, .. } => warn!(
                        key = %key.fingerprint(),
                        status,
                        error = %e,
                        "Introspection endpoint rejected the request"
                    ),
                }
                unauthorized(object, &format!("Introspection error: {}", e))
            }
        }
    }

    /// Phase 2: put the exchanged JWT on the upstream request.
    pub fn inject_jwt(mut object: HookObject) -> HookObject {
        let jwt = object
            .metadata_value(METADATA_PHANTOM_JWT)
            .filter(|jwt| !jwt.is_empty())
            .map(str::to_string);
        let Some(jwt) = jwt else {
            // Phase 1 always populates this; reaching here means a gateway misconfiguration
            warn!("No phantom JWT in metadata after auth check");
            return unauthorized(object, JWT_MISSING_POST_AUTH);
        };

        object
            .request_mut()
            .set_headers_mut()
            .insert("Authorization".to_string(), format!("Bearer {}", jwt));
        object
    }
}

#[async_trait]
impl Dispatcher for PhantomAgent {
    async fn dispatch(&self, object: HookObject) -> HookObject {
        match object.hook() {
            HookName::PhantomAuthCheck => self.auth_check(object).await,
            HookName::InjectJwtPostKeyAuth => Self::inject_jwt(object),
            HookName::Unrecognized(name) => {
                debug!(hook = %name, "Unrecognized hook, passing through");
                object
            }
        }
    }
}

/// Record an accepted exchange on the hook object.
fn accept(object: &mut HookObject, jwt: String, opaque: String) {
    let metadata = object.metadata_mut();
    metadata.insert(METADATA_PHANTOM_JWT.to_string(), jwt);
    metadata.insert(METADATA_TOKEN.to_string(), opaque);
    object.session_mut().reset_to_unlimited();
}

/// Short-circuit the request with a 401.
fn unauthorized(mut object: HookObject, message: &str) -> HookObject {
    let overrides = object
        .request_mut()
        .return_overrides
        .get_or_insert_with(ReturnOverrides::default);

    overrides.response_code = Some(401);
    overrides.response_error = Some(message.to_string());
    overrides.response_body = Some(message.to_string());
    overrides.headers.get_or_insert_with(Default::default).insert(
        "WWW-Authenticate".to_string(),
        WWW_AUTHENTICATE_INVALID_TOKEN.to_string(),
    );
    overrides.override_error = Some(true);

    object
}
