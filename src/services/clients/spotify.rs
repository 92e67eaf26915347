//! Spotify Web API client
//!
//! OAuth2 client-credentials against `/api/token`, then `/v1/search` and
//! `/v1/albums`. The token is fetched on first use and refreshed when within
//! 60s of expiry; a 401 mid-session clears the cached token so the next call
//! re-authenticates. Track search walks progressive query strategies from
//! most to least specific.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use super::types::{AlbumDetail, ArtworkUrls, TrackHit};
use super::{retry_after_seconds, RateGate, RetryPolicy, USER_AGENT};
use crate::config::SpotifyCredentials;
use crate::error::ProviderError;
use crate::services::cache::{CacheKey, CacheLookup, ResponseCache};

const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
const SPOTIFY_AUTH_URL: &str = "https://accounts.spotify.com/api/token";
const PROVIDER: &str = "spotify";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(200);
const COOLDOWN: Duration = Duration::from_secs(120);
/// Refresh this close to expiry rather than risking an in-flight 401.
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

pub struct SpotifyClient {
    http: reqwest::Client,
    base_url: String,
    auth_url: String,
    credentials: SpotifyCredentials,
    cache: Arc<dyn ResponseCache>,
    gate: RateGate,
    retry: RetryPolicy,
    token: Mutex<Option<TokenState>>,
}

struct TokenState {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<SpTrack>,
}

#[derive(Debug, Deserialize)]
struct SpTrack {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<SpArtist>,
    album: Option<SpAlbumStub>,
    #[serde(default)]
    external_urls: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SpArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpAlbumStub {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpAlbum {
    id: String,
    name: String,
    release_date: Option<String>,
    #[serde(default)]
    artists: Vec<SpArtist>,
    #[serde(default)]
    images: Vec<SpImage>,
    #[serde(default)]
    external_urls: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SpImage {
    url: String,
    width: Option<i32>,
}

impl From<SpTrack> for TrackHit {
    fn from(track: SpTrack) -> Self {
        let artist_name = track
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        TrackHit {
            id: track.id,
            title: track.name,
            artist_name,
            album_title: track.album.as_ref().map(|a| a.name.clone()),
            album_id: track.album.map(|a| a.id),
            url: track.external_urls.get("spotify").cloned(),
        }
    }
}

impl From<SpAlbum> for AlbumDetail {
    fn from(mut album: SpAlbum) -> Self {
        let artist_name = album
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let year = super::types::parse_year(album.release_date.as_deref());

        // Spotify serves images largest-first; order defensively anyway.
        album.images.sort_by(|a, b| b.width.cmp(&a.width));
        let artwork = if album.images.is_empty() {
            None
        } else {
            let large = album.images.first().map(|i| i.url.clone()).unwrap_or_default();
            let small = album.images.last().map(|i| i.url.clone()).unwrap_or_default();
            let medium = album
                .images
                .get(album.images.len() / 2)
                .map(|i| i.url.clone())
                .unwrap_or_else(|| large.clone());
            Some(ArtworkUrls {
                small,
                medium,
                large,
            })
        };

        AlbumDetail {
            id: album.id,
            title: album.name,
            artist_name,
            year,
            url: album.external_urls.get("spotify").cloned(),
            artwork,
        }
    }
}

impl SpotifyClient {
    pub fn new(credentials: SpotifyCredentials, cache: Arc<dyn ResponseCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: SPOTIFY_API_BASE.to_string(),
            auth_url: SPOTIFY_AUTH_URL.to_string(),
            credentials,
            cache,
            gate: RateGate::new(MIN_REQUEST_INTERVAL, COOLDOWN),
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
            token: Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self
    }

    pub fn with_tuning(mut self, min_interval: Duration, retry: RetryPolicy) -> Self {
        self.gate = RateGate::new(min_interval, COOLDOWN);
        self.retry = retry;
        self
    }

    /// Return a valid access token, refreshing when absent or near expiry.
    async fn ensure_token(&self) -> Result<String, ProviderError> {
        {
            let token = self.token.lock().await;
            if let Some(state) = token.as_ref() {
                if Instant::now() < state.expires_at {
                    return Ok(state.access_token.clone());
                }
            }
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(&self.auth_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::AuthFailure(format!(
                "token request failed: {} - {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let expires_at = Instant::now()
            + Duration::from_secs(token_response.expires_in).saturating_sub(TOKEN_EXPIRY_BUFFER);

        let mut token = self.token.lock().await;
        *token = Some(TokenState {
            access_token: token_response.access_token.clone(),
            expires_at,
        });

        Ok(token_response.access_token)
    }

    async fn clear_token(&self) {
        let mut token = self.token.lock().await;
        *token = None;
    }

    /// Authenticated GET with 401-refresh and bounded 429 retries.
    async fn api_get(&self, url: &str) -> Result<serde_json::Value, ProviderError> {
        let mut refreshed = false;
        let mut attempt = 0u32;

        loop {
            self.gate.wait().await;
            let token = self.ensure_token().await?;

            let response = match self.http.get(url).bearer_auth(&token).send().await {
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

            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.clear_token().await;
                if refreshed {
                    return Err(ProviderError::AuthFailure(
                        "token rejected twice".to_string(),
                    ));
                }
                refreshed = true;
                continue;
            }

            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ProviderError::NotFound);
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after_seconds(&response);
                if attempt < self.retry.max_retries {
                    let delay = retry_after
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| self.retry.backoff_delay(attempt));
                    tracing::warn!("Spotify rate limited, waiting {:?}", delay);
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

    /// Search for one track using progressive strategies, most specific
    /// first. Returns the top hit of the first strategy that produces any.
    pub async fn search_track(
        &self,
        title: &str,
        album: Option<&str>,
        artist: Option<&str>,
        year: Option<i32>,
    ) -> Result<Option<TrackHit>, ProviderError> {
        let seed = format!(
            "{}||{}||{}||{}",
            title,
            album.unwrap_or(""),
            artist.unwrap_or(""),
            year.map(|y| y.to_string()).unwrap_or_default()
        );
        let key = CacheKey::search(PROVIDER, &format!("track_{}", title), &seed);

        match self.cache.load(&key) {
            CacheLookup::Hit(value) => {
                let hit = serde_json::from_value(value)
                    .map_err(|e| ProviderError::Parse(e.to_string()))?;
                return Ok(Some(hit));
            }
            CacheLookup::NegativeHit => return Ok(None),
            CacheLookup::Miss => {}
        }

        for query in search_strategies(title, album, artist, year) {
            let url = format!(
                "{}/search?q={}&type=track&limit=10",
                self.base_url,
                urlencoding::encode(&query)
            );

            let value = self.api_get(&url).await?;
            let response: SearchResponse =
                serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;

            let items = response.tracks.map(|t| t.items).unwrap_or_default();
            if let Some(track) = items.into_iter().next() {
                let hit: TrackHit = track.into();
                if let Ok(value) = serde_json::to_value(&hit) {
                    self.cache.store(&key, &value);
                }
                return Ok(Some(hit));
            }
            tracing::debug!("No Spotify results for query: {}", query);
        }

        self.cache.store_negative(&key);
        Ok(None)
    }

    /// Album detail (title, year, artwork family). `Ok(None)` when the album
    /// id no longer resolves, which the repair pass uses to detect dead links.
    pub async fn album_detail(&self, album_id: &str) -> Result<Option<AlbumDetail>, ProviderError> {
        let key = CacheKey::entity(PROVIDER, "albums", album_id);

        let value = match self.cache.load(&key) {
            CacheLookup::Hit(value) => value,
            CacheLookup::NegativeHit => return Ok(None),
            CacheLookup::Miss => {
                let url = format!("{}/albums/{}", self.base_url, album_id);
                match self.api_get(&url).await {
                    Ok(value) => {
                        self.cache.store(&key, &value);
                        value
                    }
                    Err(ProviderError::NotFound) => {
                        self.cache.store_negative(&key);
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let album: SpAlbum =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(Some(album.into()))
    }
}

/// Build the progressive query list, most specific first.
fn search_strategies(
    title: &str,
    album: Option<&str>,
    artist: Option<&str>,
    year: Option<i32>,
) -> Vec<String> {
    let mut strategies = Vec::new();

    if let (Some(artist), Some(album), Some(year)) = (artist, album, year) {
        strategies.push(format!(
            "track:\"{}\" artist:\"{}\" album:\"{}\" year:{}",
            title, artist, album, year
        ));
    }
    if let (Some(artist), Some(album)) = (artist, album) {
        strategies.push(format!(
            "track:\"{}\" artist:\"{}\" album:\"{}\"",
            title, artist, album
        ));
    }
    if let Some(artist) = artist {
        strategies.push(format!("track:{} artist:\"{}\"", title, artist));
        strategies.push(format!("{} {}", title, artist));
    }
    if strategies.is_empty() {
        strategies.push(title.to_string());
    }

    strategies
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strategies_run_most_to_least_specific() {
        let strategies =
            search_strategies("Take Five", Some("Time Out"), Some("Dave Brubeck"), Some(1959));
        assert_eq!(strategies.len(), 4);
        assert!(strategies[0].contains("year:1959"));
        assert!(strategies[0].contains("album:\"Time Out\""));
        assert!(strategies[1].contains("album:"));
        assert!(!strategies[1].contains("year:"));
        assert!(strategies[2].starts_with("track:Take Five"));
        assert_eq!(strategies[3], "Take Five Dave Brubeck");
    }

    #[test]
    fn strategies_without_artist_fall_back_to_bare_title() {
        let strategies = search_strategies("Stardust", None, None, None);
        assert_eq!(strategies, vec!["Stardust".to_string()]);
    }

    #[test]
    fn track_conversion_joins_artists() {
        let raw = json!({
            "id": "t1",
            "name": "So What",
            "artists": [{"name": "Miles Davis"}, {"name": "John Coltrane"}],
            "album": {"id": "al1", "name": "Kind of Blue"},
            "external_urls": {"spotify": "https://open.spotify.com/track/t1"}
        });
        let track: SpTrack = serde_json::from_value(raw).unwrap();
        let hit: TrackHit = track.into();

        assert_eq!(hit.artist_name, "Miles Davis, John Coltrane");
        assert_eq!(hit.album_id.as_deref(), Some("al1"));
        assert_eq!(hit.url.as_deref(), Some("https://open.spotify.com/track/t1"));
    }

    #[test]
    fn album_conversion_orders_artwork_sizes() {
        let raw = json!({
            "id": "al1",
            "name": "Kind of Blue",
            "release_date": "1959-08-17",
            "artists": [{"name": "Miles Davis"}],
            "images": [
                {"url": "https://img.example/640.jpg", "width": 640},
                {"url": "https://img.example/300.jpg", "width": 300},
                {"url": "https://img.example/64.jpg", "width": 64}
            ],
            "external_urls": {"spotify": "https://open.spotify.com/album/al1"}
        });
        let album: SpAlbum = serde_json::from_value(raw).unwrap();
        let detail: AlbumDetail = album.into();

        assert_eq!(detail.year, Some(1959));
        let artwork = detail.artwork.unwrap();
        assert_eq!(artwork.large, "https://img.example/640.jpg");
        assert_eq!(artwork.medium, "https://img.example/300.jpg");
        assert_eq!(artwork.small, "https://img.example/64.jpg");
    }
}
