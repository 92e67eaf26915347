//! Cover Art Archive client
//!
//! JSON at `/release/{mbid}/`; the archive answers 307 redirects into an
//! `index.json` (followed transparently), 404 when the release has no art,
//! and 503 when we should back off. A 404 is a completed poll: it is cached
//! negatively and reported as `NoArtwork` so the importer can stamp
//! `cover_art_checked_at` without re-querying.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::types::{ArtImage, ArtworkLookup};
use super::{retry_after_seconds, RateGate, RetryPolicy, USER_AGENT};
use crate::error::ProviderError;
use crate::models::ImageType;
use crate::services::cache::{CacheKey, CacheLookup, ResponseCache};

const COVER_ART_API_BASE: &str = "https://coverartarchive.org";
const PROVIDER: &str = "coverart";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(500);
const COOLDOWN: Duration = Duration::from_secs(120);

pub struct CoverArtClient {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<dyn ResponseCache>,
    gate: RateGate,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct CaaResponse {
    #[serde(default)]
    images: Vec<CaaImage>,
}

#[derive(Debug, Deserialize)]
struct CaaImage {
    id: Option<serde_json::Value>,
    #[serde(default)]
    types: Vec<String>,
    image: Option<String>,
    #[serde(default)]
    thumbnails: HashMap<String, String>,
}

impl CoverArtClient {
    pub fn new(cache: Arc<dyn ResponseCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: COVER_ART_API_BASE.to_string(),
            cache,
            gate: RateGate::new(MIN_REQUEST_INTERVAL, COOLDOWN),
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
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

    /// Poll the archive for a release's imagery.
    pub async fn release_artwork(
        &self,
        release_mbid: &str,
    ) -> Result<ArtworkLookup, ProviderError> {
        let key = CacheKey::entity(PROVIDER, "releases", release_mbid);

        match self.cache.load(&key) {
            CacheLookup::Hit(value) => return Ok(self.parse_images(value)?),
            CacheLookup::NegativeHit => return Ok(ArtworkLookup::NoArtwork),
            CacheLookup::Miss => {}
        }

        let url = format!("{}/release/{}/", self.base_url, release_mbid);

        let mut attempt = 0u32;
        let value = loop {
            self.gate.wait().await;

            let response = match self.http.get(&url).send().await {
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
                self.cache.store_negative(&key);
                return Ok(ArtworkLookup::NoArtwork);
            }

            if status == reqwest::StatusCode::BAD_REQUEST {
                tracing::debug!("Cover art archive does not know release {}", release_mbid);
                return Ok(ArtworkLookup::ReleaseUnknown);
            }

            if status == reqwest::StatusCode::SERVICE_UNAVAILABLE
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            {
                let retry_after = retry_after_seconds(&response);
                if attempt < self.retry.max_retries {
                    let delay = retry_after
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| self.retry.backoff_delay(attempt));
                    tracing::warn!("Cover art archive rate limited, retrying in {:?}", delay);
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

            break response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))?;
        };

        self.cache.store(&key, &value);
        Ok(self.parse_images(value)?)
    }

    fn parse_images(&self, value: serde_json::Value) -> Result<ArtworkLookup, ProviderError> {
        let response: CaaResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;

        let mut images = Vec::new();
        for image in response.images {
            let image_type = if image.types.iter().any(|t| t == "Front") {
                ImageType::Front
            } else if image.types.iter().any(|t| t == "Back") {
                ImageType::Back
            } else {
                continue;
            };

            let small = image
                .thumbnails
                .get("250")
                .or_else(|| image.thumbnails.get("small"))
                .cloned();
            let medium = image
                .thumbnails
                .get("500")
                .or_else(|| image.thumbnails.get("large"))
                .cloned();
            let large = image
                .thumbnails
                .get("1200")
                .cloned()
                .or_else(|| image.image.clone());

            images.push(ArtImage {
                image_type,
                small_url: small.map(ensure_https),
                medium_url: medium.map(ensure_https),
                large_url: large.map(ensure_https),
                source_id: image.id.as_ref().map(json_id_string),
                source_url: image.image.clone().map(ensure_https),
            });
        }

        if images.is_empty() {
            Ok(ArtworkLookup::NoArtwork)
        } else {
            Ok(ArtworkLookup::Found(images))
        }
    }
}

/// The archive serves image URLs over http; normalize to https.
fn ensure_https(url: String) -> String {
    if let Some(rest) = url.strip_prefix("http://") {
        format!("https://{}", rest)
    } else {
        url
    }
}

/// Image ids arrive as JSON numbers or strings depending on archive vintage.
fn json_id_string(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::MemoryCache;
    use serde_json::json;

    #[test]
    fn https_normalization() {
        assert_eq!(
            ensure_https("http://coverartarchive.org/x.jpg".to_string()),
            "https://coverartarchive.org/x.jpg"
        );
        assert_eq!(
            ensure_https("https://already.example/x.jpg".to_string()),
            "https://already.example/x.jpg"
        );
    }

    #[test]
    fn front_and_back_are_kept_other_types_dropped() {
        let client = CoverArtClient::new(Arc::new(MemoryCache::new()));
        let payload = json!({
            "images": [
                {"id": 101, "types": ["Front"], "image": "http://caa.example/101.jpg",
                 "thumbnails": {"250": "http://caa.example/101-250.jpg", "500": "http://caa.example/101-500.jpg"}},
                {"id": 102, "types": ["Back"], "image": "http://caa.example/102.jpg",
                 "thumbnails": {"small": "http://caa.example/102-small.jpg", "large": "http://caa.example/102-large.jpg"}},
                {"id": 103, "types": ["Booklet"], "image": "http://caa.example/103.jpg", "thumbnails": {}}
            ]
        });

        let ArtworkLookup::Found(images) = client.parse_images(payload).unwrap() else {
            panic!("expected images");
        };

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].image_type, ImageType::Front);
        assert_eq!(
            images[0].small_url.as_deref(),
            Some("https://caa.example/101-250.jpg")
        );
        assert_eq!(images[0].source_id.as_deref(), Some("101"));
        // Back image falls through to the small/large thumbnail names.
        assert_eq!(
            images[1].medium_url.as_deref(),
            Some("https://caa.example/102-large.jpg")
        );
        assert_eq!(
            images[1].large_url.as_deref(),
            Some("https://caa.example/102.jpg")
        );
    }

    #[test]
    fn payload_without_usable_images_is_no_artwork() {
        let client = CoverArtClient::new(Arc::new(MemoryCache::new()));
        let payload = json!({"images": [{"id": 1, "types": ["Medium"], "thumbnails": {}}]});
        assert!(matches!(
            client.parse_images(payload).unwrap(),
            ArtworkLookup::NoArtwork
        ));
    }
}
