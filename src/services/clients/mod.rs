//! Provider clients
//!
//! One rate-limited, disk-cached HTTP client per external provider:
//! - MusicBrainz (works, recordings, releases, artists)
//! - Cover Art Archive (release imagery)
//! - iTunes Search API (albums, tracks, artwork URLs; no auth)
//! - Spotify Web API (track/album search; client-credentials OAuth)
//! - JazzStandards.com (editorial index and song pages; HTML scrape)
//! - Wikipedia / Wikimedia Commons (reference pages, performer portraits)
//!
//! Clients own mutable rate-limit and token state and are NOT safe to share
//! across concurrent imports; each worker builds its own client set.

pub mod cover_art;
pub mod itunes;
pub mod jazz_standards;
pub mod musicbrainz;
pub mod spotify;
pub mod types;
pub mod wikimedia;

pub use cover_art::CoverArtClient;
pub use itunes::ItunesClient;
pub use jazz_standards::JazzStandardsClient;
pub use musicbrainz::MusicBrainzClient;
pub use spotify::SpotifyClient;
pub use types::*;
pub use wikimedia::WikimediaClient;

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

/// User agent sent to every provider (MusicBrainz requires a contactable one).
pub const USER_AGENT: &str =
    "JazzDiscographyPipeline/1.0 (https://github.com/jazzreference/jazz-discography-pipeline)";

/// Retry tuning for one provider.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    /// Exponential backoff: base, 2x, 4x, ...
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt)
    }
}

struct GateState {
    last_request: Option<Instant>,
    cooldown_until: Option<Instant>,
}

/// Cooperative rate limiter: before each outbound request the owner waits
/// until `last_request + min_interval`, and sits out any provider-wide
/// cooldown entered after retry exhaustion.
pub struct RateGate {
    state: Mutex<GateState>,
    min_interval: Duration,
    cooldown: Duration,
}

impl RateGate {
    pub fn new(min_interval: Duration, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(GateState {
                last_request: None,
                cooldown_until: None,
            }),
            min_interval,
            cooldown,
        }
    }

    /// Sleep until the next request slot, then claim it.
    pub async fn wait(&self) {
        let mut state = self.state.lock().await;

        if let Some(until) = state.cooldown_until {
            let now = Instant::now();
            if now < until {
                let remaining = until - now;
                tracing::warn!(
                    "In provider cooldown, waiting {:.0}s before next attempt",
                    remaining.as_secs_f64()
                );
                sleep(remaining).await;
            }
            state.cooldown_until = None;
        }

        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }

        state.last_request = Some(Instant::now());
    }

    /// Enter a provider-wide cooldown; subsequent `wait` calls sleep it off.
    pub async fn enter_cooldown(&self) {
        let mut state = self.state.lock().await;
        state.cooldown_until = Some(Instant::now() + self.cooldown);
    }
}

/// Parse a `Retry-After` header (seconds form) from a response.
pub fn retry_after_seconds(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn rate_gate_spaces_requests() {
        let gate = RateGate::new(Duration::from_millis(40), Duration::from_secs(1));
        let start = Instant::now();
        gate.wait().await;
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn cooldown_delays_the_next_wait() {
        let gate = RateGate::new(Duration::from_millis(1), Duration::from_millis(50));
        gate.wait().await;
        gate.enter_cooldown().await;
        let start = Instant::now();
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
