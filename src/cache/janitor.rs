//! Background cache reclamation task.
//!
//! Periodically sweeps expired JWTs and enforces the capacity bound.

use std::sync::Weak;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info};

use super::store::JwtCache;

/// Default reclamation interval in seconds.
pub const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 60;

/// Spawn a task that runs a reclamation pass every `every`.
///
/// The task holds only a weak reference and exits once the cache is dropped.
pub fn spawn_janitor_task(cache: Weak<JwtCache>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(cache) = cache.upgrade() else {
                debug!("JWT cache dropped, janitor exiting");
                break;
            };

            let stats = cache.reclaim();
            if stats.expired > 0 || stats.evicted > 0 {
                info!(
                    expired = stats.expired,
                    evicted = stats.evicted,
                    remaining = stats.remaining,
                    "JWT cache reclamation completed"
                );
            } else {
                debug!(cached_tokens = stats.remaining, "JWT cache reclamation: nothing to do");
            }
        }
    })
}
