//! iTunes Search API client (no auth)
//!
//! Public JSON at `/search` and `/lookup`. iTunes signals rate limiting with
//! 403 rather than 429, and its limits are undocumented, so the backoff base
//! is long (10s, doubling) and exhaustion enters a provider-wide cooldown.
//! Artwork URLs are templated: the API hands out a 100x100 URL and larger
//! sizes are derived by size substitution.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::types::{AlbumHit, ArtworkUrls, TrackHit};
use super::{retry_after_seconds, RateGate, RetryPolicy, USER_AGENT};
use crate::error::ProviderError;
use crate::services::cache::{CacheKey, CacheLookup, ResponseCache};

const ITUNES_API_BASE: &str = "https://itunes.apple.com";
const PROVIDER: &str = "itunes";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(500);
const COOLDOWN: Duration = Duration::from_secs(120);

pub struct ItunesClient {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<dyn ResponseCache>,
    gate: RateGate,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ItunesResponse {
    #[serde(default)]
    results: Vec<ItunesResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItunesResult {
    collection_id: Option<i64>,
    track_id: Option<i64>,
    artist_name: Option<String>,
    collection_name: Option<String>,
    track_name: Option<String>,
    release_date: Option<String>,
    artwork_url100: Option<String>,
    collection_view_url: Option<String>,
    track_view_url: Option<String>,
}

impl ItunesResult {
    fn release_year(&self) -> Option<i32> {
        let date = self.release_date.as_deref()?;
        if date.len() >= 4 {
            date[..4].parse().ok()
        } else {
            None
        }
    }

    fn into_album_hit(self) -> Option<AlbumHit> {
        let year = self.release_year();
        Some(AlbumHit {
            id: self.collection_id?.to_string(),
            title: self.collection_name?,
            artist_name: self.artist_name.unwrap_or_default(),
            year,
            url: self.collection_view_url,
            artwork_url_100: self.artwork_url100,
        })
    }

    fn into_track_hit(self) -> Option<TrackHit> {
        Some(TrackHit {
            id: self.track_id?.to_string(),
            title: self.track_name?,
            artist_name: self.artist_name.unwrap_or_default(),
            album_title: self.collection_name,
            album_id: self.collection_id.map(|id| id.to_string()),
            url: self.track_view_url,
        })
    }
}

impl ItunesClient {
    pub fn new(cache: Arc<dyn ResponseCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: ITUNES_API_BASE.to_string(),
            cache,
            gate: RateGate::new(MIN_REQUEST_INTERVAL, COOLDOWN),
            retry: RetryPolicy::new(4, Duration::from_secs(10)),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_tuning(mut self, min_interval: Duration, retry: RetryPolicy) -> Self {
        self.gate = RateGate::new(min_interval, COOLDOWN);
        self.retry = retry;
        self
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value, ProviderError> {
        let mut attempt = 0u32;
        loop {
            self.gate.wait().await;

            let response = match self.http.get(url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if attempt < self.retry.max_retries {
                        tokio::time::sleep(self.retry.backoff_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ProviderError::from_transport(e));
                }
            };

            let status = response.status();

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ProviderError::NotFound);
            }

            // iTunes uses 403 as its rate-limit signal, not just 429.
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::FORBIDDEN
            {
                let retry_after = retry_after_seconds(&response);
                if attempt < self.retry.max_retries {
                    let delay = retry_after
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| self.retry.backoff_delay(attempt));
                    tracing::warn!(
                        "iTunes rate limit hit (attempt {}/{}), waiting {:?}",
                        attempt + 1,
                        self.retry.max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                self.gate.enter_cooldown().await;
                return Err(ProviderError::RateLimited { retry_after });
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Upstream {
                    status: status.as_u16(),
                    body,
                });
            }

            return response
                .json()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()));
        }
    }

    async fn cached_search(
        &self,
        key: &CacheKey,
        url: &str,
    ) -> Result<Vec<ItunesResult>, ProviderError> {
        let value = match self.cache.load(key) {
            CacheLookup::Hit(value) => value,
            CacheLookup::NegativeHit => return Ok(Vec::new()),
            CacheLookup::Miss => {
                let value = self.get_json(url).await?;
                self.cache.store(key, &value);
                value
            }
        };

        let response: ItunesResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(response.results)
    }

    /// Album search by artist (optionally constrained by album title).
    pub async fn search_albums(
        &self,
        artist_name: &str,
        album_title: Option<&str>,
    ) -> Result<Vec<AlbumHit>, ProviderError> {
        let term = match album_title {
            Some(album) => format!("{} {}", artist_name, album),
            None => artist_name.to_string(),
        };
        let key = CacheKey::search(PROVIDER, &format!("album_{}", term), &format!("{}||album", term));
        let url = format!(
            "{}/search?term={}&entity=album&limit=25",
            self.base_url,
            urlencoding::encode(&term)
        );

        let results = self.cached_search(&key, &url).await?;
        Ok(results
            .into_iter()
            .filter_map(ItunesResult::into_album_hit)
            .collect())
    }

    /// Track search by artist + title.
    pub async fn search_tracks(
        &self,
        artist_name: &str,
        track_title: &str,
    ) -> Result<Vec<TrackHit>, ProviderError> {
        let term = format!("{} {}", artist_name, track_title);
        let key = CacheKey::search(PROVIDER, &format!("song_{}", term), &format!("{}||song", term));
        let url = format!(
            "{}/search?term={}&entity=song&limit=25",
            self.base_url,
            urlencoding::encode(&term)
        );

        let results = self.cached_search(&key, &url).await?;
        Ok(results
            .into_iter()
            .filter_map(ItunesResult::into_track_hit)
            .collect())
    }

    /// Album lookup by collection id.
    pub async fn lookup_album(&self, album_id: &str) -> Result<Option<AlbumHit>, ProviderError> {
        let key = CacheKey::entity(PROVIDER, "albums", album_id);
        let url = format!("{}/lookup?id={}", self.base_url, urlencoding::encode(album_id));

        let value = match self.cache.load(&key) {
            CacheLookup::Hit(value) => value,
            CacheLookup::NegativeHit => return Ok(None),
            CacheLookup::Miss => {
                let value = self.get_json(&url).await?;
                self.cache.store(&key, &value);
                value
            }
        };

        let response: ItunesResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(response
            .results
            .into_iter()
            .filter_map(ItunesResult::into_album_hit)
            .next())
    }
}

/// Derive the artwork size family from the provider's 100x100 URL.
///
/// The small URL is the original; only medium and large are derived by
/// substitution.
pub fn artwork_urls(artwork_url_100: &str) -> ArtworkUrls {
    ArtworkUrls {
        small: artwork_url_100.to_string(),
        medium: artwork_url_100.replace("100x100", "300x300"),
        large: artwork_url_100.replace("100x100", "600x600"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn artwork_size_substitution() {
        let urls = artwork_urls("https://is1.example/image/thumb/abc/100x100bb.jpg");
        assert_eq!(urls.small, "https://is1.example/image/thumb/abc/100x100bb.jpg");
        assert_eq!(urls.medium, "https://is1.example/image/thumb/abc/300x300bb.jpg");
        assert_eq!(urls.large, "https://is1.example/image/thumb/abc/600x600bb.jpg");
    }

    #[test]
    fn result_conversion_to_album_and_track() {
        let raw = json!({
            "collectionId": 123,
            "trackId": 456,
            "artistName": "Miles Davis",
            "collectionName": "Kind of Blue",
            "trackName": "So What",
            "releaseDate": "1959-08-17T07:00:00Z",
            "artworkUrl100": "https://is1.example/100x100bb.jpg",
            "collectionViewUrl": "https://music.example/album/123",
            "trackViewUrl": "https://music.example/track/456"
        });

        let album: ItunesResult = serde_json::from_value(raw.clone()).unwrap();
        let album = album.into_album_hit().unwrap();
        assert_eq!(album.id, "123");
        assert_eq!(album.year, Some(1959));
        assert_eq!(album.artist_name, "Miles Davis");

        let track: ItunesResult = serde_json::from_value(raw).unwrap();
        let track = track.into_track_hit().unwrap();
        assert_eq!(track.id, "456");
        assert_eq!(track.album_title.as_deref(), Some("Kind of Blue"));
        assert_eq!(track.album_id.as_deref(), Some("123"));
    }

    #[test]
    fn results_missing_ids_are_skipped() {
        let raw = json!({"artistName": "Nobody"});
        let result: ItunesResult = serde_json::from_value(raw).unwrap();
        assert!(result.into_album_hit().is_none());
    }
}
