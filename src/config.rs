//! Process configuration.
//!
//! Read once at startup from flags or environment and immutable afterwards.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use reqwest::Url;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 50051;
pub const DEFAULT_TIMEOUT_SECS: f64 = 2.5;
pub const DEFAULT_CACHE_MAX_ENTRIES: i64 = 10_000;
pub const DEFAULT_JANITOR_SECS: u64 = crate::cache::DEFAULT_JANITOR_INTERVAL_SECS;
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 30;
/// Upper bound on the clock skew margin. Larger values would never cache anything.
pub const MAX_CLOCK_SKEW_SECS: u64 = 86_400;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "phantom-token-agent")]
#[command(about = "Phantom token plugin: exchanges opaque access tokens for JWTs via introspection")]
pub struct Args {
    /// Token introspection endpoint URL
    #[arg(long, env = "INTROSPECTION_URL")]
    pub introspection_url: Option<String>,

    /// Client ID used to authenticate against the introspection endpoint
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: Option<String>,

    /// Client secret used to authenticate against the introspection endpoint
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Port the dispatch endpoint listens on
    #[arg(long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    /// Introspection request timeout in seconds (fractional allowed)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "TIMEOUT_SECONDS")]
    pub timeout_seconds: f64,

    /// Maximum cached JWTs (0 or negative disables the bound)
    #[arg(
        long,
        default_value_t = DEFAULT_CACHE_MAX_ENTRIES,
        env = "CACHE_MAX_ENTRIES",
        allow_negative_numbers = true
    )]
    pub cache_max_entries: i64,

    /// Seconds between cache reclamation passes
    #[arg(long, default_value_t = DEFAULT_JANITOR_SECS, env = "CACHE_JANITOR_SECONDS")]
    pub cache_janitor_seconds: u64,

    /// Seconds subtracted from a JWT's expiry before it is trusted
    #[arg(long, default_value_t = DEFAULT_CLOCK_SKEW_SECS, env = "CLOCK_SKEW_SECONDS")]
    pub clock_skew_seconds: u64,

    /// Enable verbose logging
    #[arg(short, long, env = "PHANTOM_VERBOSE")]
    pub verbose: bool,
}

/// Validated agent configuration.
#[derive(Clone)]
pub struct PhantomConfig {
    pub introspection_url: Url,
    pub client_id: String,
    pub client_secret: String,
    pub port: u16,
    /// Introspection request timeout.
    pub timeout: Duration,
    /// `None` when capacity enforcement is disabled.
    pub cache_max_entries: Option<usize>,
    pub janitor_interval: Duration,
    pub clock_skew: chrono::Duration,
}

impl std::fmt::Debug for PhantomConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhantomConfig")
            .field("introspection_url", &self.introspection_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("janitor_interval", &self.janitor_interval)
            .field("clock_skew", &self.clock_skew)
            .finish()
    }
}

impl PhantomConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let (url, client_id, client_secret) = match (
            non_empty(&args.introspection_url),
            non_empty(&args.client_id),
            non_empty(&args.client_secret),
        ) {
            (Some(url), Some(id), Some(secret)) => (url, id, secret),
            _ => bail!("INTROSPECTION_URL, CLIENT_ID, and CLIENT_SECRET must be set"),
        };

        let introspection_url = Url::parse(url)
            .with_context(|| format!("Invalid INTROSPECTION_URL: {}", url))?;
        if !matches!(introspection_url.scheme(), "http" | "https") {
            bail!("INTROSPECTION_URL must be an HTTP(S) URL");
        }

        let timeout = parse_timeout(args.timeout_seconds);

        // 0 or negative disables capacity enforcement
        let cache_max_entries = usize::try_from(args.cache_max_entries)
            .ok()
            .filter(|max| *max > 0);

        let janitor_interval = if args.cache_janitor_seconds == 0 {
            warn!(
                default = DEFAULT_JANITOR_SECS,
                "CACHE_JANITOR_SECONDS must be positive, using default"
            );
            Duration::from_secs(DEFAULT_JANITOR_SECS)
        } else {
            Duration::from_secs(args.cache_janitor_seconds)
        };

        if args.clock_skew_seconds > MAX_CLOCK_SKEW_SECS {
            bail!(
                "CLOCK_SKEW_SECONDS must be at most {}, got {}",
                MAX_CLOCK_SKEW_SECS,
                args.clock_skew_seconds
            );
        }
        let clock_skew = i64::try_from(args.clock_skew_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| anyhow!("CLOCK_SKEW_SECONDS out of range: {}", args.clock_skew_seconds))?;

        Ok(Self {
            introspection_url,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            port: args.port,
            timeout,
            cache_max_entries,
            janitor_interval,
            clock_skew,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_timeout(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(timeout) if !timeout.is_zero() => timeout,
        _ => {
            warn!(
                value = secs,
                default = DEFAULT_TIMEOUT_SECS,
                "TIMEOUT_SECONDS must be a positive number, using default"
            );
            Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS)
        }
    }
}
