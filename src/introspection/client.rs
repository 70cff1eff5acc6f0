//! Introspection client: exchanges an opaque token for its JWT form.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tracing::{debug, warn};

use crate::token::{is_compact, parse_jwt_expiry};

/// Media type requesting the JWT representation of the introspection result.
pub const ACCEPT_JWT: &str = "application/jwt";

/// Validity assumed for a JWT whose `exp` claim could not be read.
pub const FALLBACK_VALIDITY_SECS: i64 = 30;

/// Maximum bytes of an error response body kept for diagnostics.
const ERROR_BODY_LIMIT: usize = 512;

/// Introspection failures. An inactive token is not an error.
#[derive(Debug, Error)]
pub enum IntrospectionError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("introspection status {status}: {body}")]
    Status { status: u16, body: String },
}

/// A JWT obtained by introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhantomJwt {
    pub jwt: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful introspection round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntrospectionOutcome {
    /// The token is active; here is its JWT.
    Active(PhantomJwt),
    /// The endpoint answered but returned no JWT: inactive or unknown token.
    Inactive,
}

/// Exchange of an opaque token for a JWT.
#[async_trait]
pub trait Introspector: Send + Sync {
    async fn introspect(&self, opaque: &str) -> Result<IntrospectionOutcome, IntrospectionError>;
}

/// HTTP introspection client (RFC 7662 with `Accept: application/jwt`).
pub struct IntrospectionClient {
    endpoint: Url,
    client_id: String,
    client_secret: String,
    http_client: reqwest::Client,
}

impl IntrospectionClient {
    /// Create a client. `timeout` bounds the whole request, body included.
    pub fn new(
        endpoint: Url,
        client_id: String,
        client_secret: String,
        timeout: std::time::Duration,
    ) -> Result<Self, IntrospectionError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint,
            client_id,
            client_secret,
            http_client,
        })
    }
}

#[async_trait]
impl Introspector for IntrospectionClient {
    async fn introspect(&self, opaque: &str) -> Result<IntrospectionOutcome, IntrospectionError> {
        debug!(url = %self.endpoint, "Introspecting opaque token");

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .header(ACCEPT, ACCEPT_JWT)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", opaque)])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let excerpt = read_excerpt(response, ERROR_BODY_LIMIT).await;
            return Err(IntrospectionError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&excerpt).trim().to_string(),
            });
        }

        let body = response.text().await?;
        let jwt = body.trim();
        if !is_compact(jwt) {
            debug!("Introspection returned no JWT, token is inactive");
            return Ok(IntrospectionOutcome::Inactive);
        }

        let expires_at = match parse_jwt_expiry(jwt) {
            Ok(exp) => exp,
            Err(e) => {
                warn!(
                    error = %e,
                    fallback_secs = FALLBACK_VALIDITY_SECS,
                    "Could not read JWT expiry, using fallback validity"
                );
                Utc::now() + Duration::seconds(FALLBACK_VALIDITY_SECS)
            }
        };

        Ok(IntrospectionOutcome::Active(PhantomJwt {
            jwt: jwt.to_string(),
            expires_at,
        }))
    }
}

/// Read at most `limit` bytes of a response body, stopping at the first
/// chunk that reaches it. Read errors end the excerpt early.
async fn read_excerpt(mut response: reqwest::Response, limit: usize) -> Vec<u8> {
    let mut excerpt = Vec::with_capacity(limit);
    while excerpt.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - excerpt.len());
                excerpt.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Failed reading introspection error body");
                break;
            }
        }
    }
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mint_jwt(exp: i64) -> String {
        encode(
            &Header::default(),
            &json!({"sub": "alice", "exp": exp}),
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    fn client_for(server: &MockServer, timeout: std::time::Duration) -> IntrospectionClient {
        let url = Url::parse(&format!("{}/introspect", server.uri())).unwrap();
        IntrospectionClient::new(url, "gateway".to_string(), "s3cret".to_string(), timeout).unwrap()
    }

    #[tokio::test]
    async fn test_active_token_returns_jwt_and_expiry() {
        let server = MockServer::start().await;
        let exp = Utc::now().timestamp() + 120;
        let jwt = mint_jwt(exp);

        Mock::given(method("POST"))
            .and(path("/introspect"))
            .and(header("accept", ACCEPT_JWT))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(header(
                "authorization",
                format!("Basic {}", BASE64.encode("gateway:s3cret")).as_str(),
            ))
            .and(body_string_contains("token=opaque-123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{}\n", jwt)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, std::time::Duration::from_secs(2));
        let outcome = client.introspect("opaque-123").await.unwrap();

        assert_eq!(
            outcome,
            IntrospectionOutcome::Active(PhantomJwt {
                jwt,
                expires_at: DateTime::from_timestamp(exp, 0).unwrap(),
            })
        );
    }

    #[tokio::test]
    async fn test_non_token_body_is_inactive() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let client = client_for(&server, std::time::Duration::from_secs(2));
        let outcome = client.introspect("opaque").await.unwrap();
        assert_eq!(outcome, IntrospectionOutcome::Inactive);
    }

    #[tokio::test]
    async fn test_error_status_carries_body_excerpt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("  invalid_client  "))
            .mount(&server)
            .await;

        let client = client_for(&server, std::time::Duration::from_secs(2));
        let err = client.introspect("opaque").await.unwrap_err();
        match &err {
            IntrospectionError::Status { status, body } => {
                assert_eq!(*status, 401);
                assert_eq!(body, "invalid_client");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "introspection status 401: invalid_client");
    }

    #[tokio::test]
    async fn test_error_body_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;

        let client = client_for(&server, std::time::Duration::from_secs(2));
        match client.introspect("opaque").await.unwrap_err() {
            IntrospectionError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), ERROR_BODY_LIMIT);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_excerpt_reads_at_most_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("y".repeat(1 << 20)))
            .mount(&server)
            .await;

        let response = reqwest::Client::new()
            .post(format!("{}/introspect", server.uri()))
            .send()
            .await
            .unwrap();
        let excerpt = read_excerpt(response, ERROR_BODY_LIMIT).await;
        assert_eq!(excerpt.len(), ERROR_BODY_LIMIT);
        assert!(excerpt.iter().all(|b| *b == b'y'));

        let response = reqwest::Client::new()
            .post(format!("{}/introspect", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(read_excerpt(response, 16).await, b"y".repeat(16));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(mint_jwt(Utc::now().timestamp() + 120))
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, std::time::Duration::from_millis(100));
        let err = client.introspect("opaque").await.unwrap_err();
        assert!(matches!(err, IntrospectionError::Transport(_)));
    }

    #[tokio::test]
    async fn test_unreadable_expiry_uses_fallback() {
        let server = MockServer::start().await;
        // Three segments, but the payload carries no exp claim
        let jwt = encode(
            &Header::default(),
            &json!({"sub": "alice"}),
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(jwt.clone()))
            .mount(&server)
            .await;

        let before = Utc::now();
        let client = client_for(&server, std::time::Duration::from_secs(2));
        let outcome = client.introspect("opaque").await.unwrap();

        match outcome {
            IntrospectionOutcome::Active(phantom) => {
                assert_eq!(phantom.jwt, jwt);
                let validity = phantom.expires_at - before;
                assert!(validity >= Duration::seconds(FALLBACK_VALIDITY_SECS - 1));
                assert!(validity <= Duration::seconds(FALLBACK_VALIDITY_SECS + 5));
            }
            IntrospectionOutcome::Inactive => panic!("expected an active token"),
        }
    }
}
