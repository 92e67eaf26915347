//! MusicBrainz client
//!
//! JSON REST over `ws/2/{entity}` with the `inc=` parameter controlling
//! included relations. Rate limit: 1 request/second, proper User-Agent
//! required. 404s are cached as negative results so known misses are never
//! re-queried within the TTL.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::types::*;
use super::{retry_after_seconds, RateGate, RetryPolicy, USER_AGENT};
use crate::error::ProviderError;
use crate::services::cache::{CacheKey, CacheLookup, ResponseCache};
use crate::services::resolver::normalize_title;

const MUSICBRAINZ_API_BASE: &str = "https://musicbrainz.org/ws/2";
const PROVIDER: &str = "musicbrainz";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1100);
const COOLDOWN: Duration = Duration::from_secs(120);

/// Rate-limited, cached MusicBrainz client.
pub struct MusicBrainzClient {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<dyn ResponseCache>,
    gate: RateGate,
    retry: RetryPolicy,
}

// Raw API payloads. Field names follow the wire format (kebab-case).

#[derive(Debug, Deserialize)]
struct WorkSearchResponse {
    #[serde(default)]
    works: Vec<MbWork>,
}

#[derive(Debug, Deserialize)]
struct MbWork {
    id: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct MbWorkDetail {
    #[serde(default)]
    relations: Vec<MbWorkRelation>,
}

#[derive(Debug, Deserialize)]
struct MbWorkRelation {
    recording: Option<MbRecordingStub>,
}

#[derive(Debug, Deserialize)]
struct MbRecordingStub {
    id: String,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MbArtistStub {
    id: String,
    name: Option<String>,
    #[serde(rename = "sort-name")]
    sort_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MbArtistCredit {
    name: String,
    artist: Option<MbArtistStub>,
}

#[derive(Debug, Deserialize)]
struct MbRelation {
    #[serde(rename = "type")]
    relation_type: String,
    artist: Option<MbArtistStub>,
    #[serde(default)]
    attributes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MbRelease {
    id: String,
    title: String,
    date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
}

#[derive(Debug, Deserialize)]
struct MbRecording {
    id: String,
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
    #[serde(rename = "first-release-date")]
    first_release_date: Option<String>,
    #[serde(default)]
    releases: Vec<MbRelease>,
    #[serde(default)]
    relations: Vec<MbRelation>,
}

#[derive(Debug, Deserialize)]
struct MbReleaseDetail {
    id: String,
    title: String,
    date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
    #[serde(default)]
    relations: Vec<MbRelation>,
}

#[derive(Debug, Deserialize)]
struct MbLifeSpan {
    begin: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MbArtist {
    id: String,
    name: String,
    #[serde(rename = "sort-name")]
    sort_name: Option<String>,
    disambiguation: Option<String>,
    #[serde(rename = "type")]
    artist_type: Option<String>,
    #[serde(rename = "life-span")]
    life_span: Option<MbLifeSpan>,
    score: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ArtistSearchResponse {
    #[serde(default)]
    artists: Vec<MbArtist>,
}

fn convert_credit(credits: Vec<MbArtistCredit>) -> Vec<ArtistCreditRef> {
    credits
        .into_iter()
        .map(|c| ArtistCreditRef {
            name: c.name,
            artist_id: c.artist.map(|a| a.id),
        })
        .collect()
}

fn convert_relations(relations: Vec<MbRelation>) -> Vec<ArtistRel> {
    relations
        .into_iter()
        .filter_map(|r| {
            let artist = r.artist?;
            Some(ArtistRel {
                relation_type: r.relation_type,
                artist_id: Some(artist.id),
                artist_name: artist.name,
                artist_sort_name: artist.sort_name,
                attributes: r.attributes,
            })
        })
        .collect()
}

impl From<MbRecording> for RecordingDetail {
    fn from(rec: MbRecording) -> Self {
        RecordingDetail {
            id: rec.id,
            title: rec.title,
            artist_credit: convert_credit(rec.artist_credit),
            first_release_date: rec.first_release_date,
            releases: rec
                .releases
                .into_iter()
                .map(|r| ReleaseRef {
                    id: r.id,
                    title: r.title,
                    date: r.date,
                    artist_credit: convert_credit(r.artist_credit),
                    track_position: None,
                })
                .collect(),
            relations: convert_relations(rec.relations),
        }
    }
}

impl From<MbReleaseDetail> for ReleaseDetail {
    fn from(rel: MbReleaseDetail) -> Self {
        ReleaseDetail {
            id: rel.id,
            title: rel.title,
            date: rel.date,
            artist_credit: convert_credit(rel.artist_credit),
            relations: convert_relations(rel.relations),
        }
    }
}

impl From<MbArtist> for ArtistCandidate {
    fn from(artist: MbArtist) -> Self {
        let begin_date = artist.life_span.as_ref().and_then(|ls| ls.begin.clone());
        ArtistCandidate {
            id: artist.id,
            name: artist.name,
            sort_name: artist.sort_name,
            disambiguation: artist.disambiguation,
            artist_type: artist.artist_type,
            score: artist.score,
            begin_date,
        }
    }
}

impl From<MbArtist> for ArtistDetail {
    fn from(artist: MbArtist) -> Self {
        let (begin_date, end_date) = match artist.life_span {
            Some(ls) => (ls.begin, ls.end),
            None => (None, None),
        };
        ArtistDetail {
            id: artist.id,
            name: artist.name,
            sort_name: artist.sort_name,
            disambiguation: artist.disambiguation,
            artist_type: artist.artist_type,
            begin_date,
            end_date,
        }
    }
}

impl MusicBrainzClient {
    pub fn new(cache: Arc<dyn ResponseCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: MUSICBRAINZ_API_BASE.to_string(),
            cache,
            gate: RateGate::new(MIN_REQUEST_INTERVAL, COOLDOWN),
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
        }
    }

    /// Point the client at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override rate-limit and retry tuning (tests).
    pub fn with_tuning(mut self, min_interval: Duration, retry: RetryPolicy) -> Self {
        self.gate = RateGate::new(min_interval, COOLDOWN);
        self.retry = retry;
        self
    }

    /// One rate-limited GET with bounded retries. 404 maps to `NotFound`;
    /// 429/503 back off (honoring Retry-After) and enter the provider
    /// cooldown once retries run out.
    async fn get_json(&self, url: &str) -> Result<serde_json::Value, ProviderError> {
        let mut attempt = 0u32;
        loop {
            self.gate.wait().await;

            let response = match self.http.get(url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if attempt < self.retry.max_retries {
                        let delay = self.retry.backoff_delay(attempt);
                        tracing::warn!("MusicBrainz request failed ({}), retrying in {:?}", e, delay);
                        tokio::time::sleep(delay).await;
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

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
            {
                let retry_after = retry_after_seconds(&response);
                if attempt < self.retry.max_retries {
                    let delay = retry_after
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| self.retry.backoff_delay(attempt));
                    tracing::warn!(
                        "MusicBrainz rate limited (attempt {}/{}), waiting {:?}",
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

    /// Cache-through entity lookup. `Ok(None)` means the provider confirmed
    /// absence (fresh 404 or negative cache hit).
    async fn cached_get(
        &self,
        key: &CacheKey,
        url: &str,
    ) -> Result<Option<serde_json::Value>, ProviderError> {
        match self.cache.load(key) {
            CacheLookup::Hit(value) => return Ok(Some(value)),
            CacheLookup::NegativeHit => return Ok(None),
            CacheLookup::Miss => {}
        }

        match self.get_json(url).await {
            Ok(value) => {
                self.cache.store(key, &value);
                Ok(Some(value))
            }
            Err(ProviderError::NotFound) => {
                self.cache.store_negative(key);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Search for a work by title. Quoted-phrase search first, unquoted
    /// fallback, accepting only an exact match under title normalization.
    /// The resolved result (or the miss) is cached.
    pub async fn search_work(
        &self,
        title: &str,
        composer: Option<&str>,
    ) -> Result<Option<WorkRef>, ProviderError> {
        let seed = format!("{}||{}", title, composer.unwrap_or(""));
        let key = CacheKey::search(PROVIDER, &format!("work_{}", title), &seed);

        match self.cache.load(&key) {
            CacheLookup::Hit(value) => {
                let work = serde_json::from_value(value)
                    .map_err(|e| ProviderError::Parse(e.to_string()))?;
                return Ok(Some(work));
            }
            CacheLookup::NegativeHit => return Ok(None),
            CacheLookup::Miss => {}
        }

        // Quoted phrase is the precise strategy; composer is deliberately
        // left out of the query because it over-constrains, we filter by
        // normalized title instead.
        let mut works = self.run_work_search(&format!("work:\"{}\"", title)).await?;
        if works.is_empty() {
            tracing::debug!("No quoted-search results for '{}', trying unquoted", title);
            works = self.run_work_search(title).await?;
        }

        let wanted = normalize_title(title);
        let matched = works
            .into_iter()
            .find(|w| normalize_title(&w.title) == wanted)
            .map(|w| WorkRef {
                id: w.id,
                title: w.title,
            });

        match &matched {
            Some(work) => {
                let value =
                    serde_json::to_value(work).map_err(|e| ProviderError::Parse(e.to_string()))?;
                self.cache.store(&key, &value);
            }
            None => self.cache.store_negative(&key),
        }

        Ok(matched)
    }

    async fn run_work_search(&self, query: &str) -> Result<Vec<MbWork>, ProviderError> {
        let url = format!(
            "{}/work/?query={}&fmt=json&limit=10",
            self.base_url,
            urlencoding::encode(query)
        );
        let value = self.get_json(&url).await?;
        let response: WorkSearchResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(response.works)
    }

    /// Recordings related to a work (`inc=recording-rels`).
    pub async fn work_recordings(&self, work_id: &str) -> Result<Vec<RecordingRef>, ProviderError> {
        let key = CacheKey::entity(PROVIDER, "works", work_id);
        let url = format!("{}/work/{}?inc=recording-rels&fmt=json", self.base_url, work_id);

        let Some(value) = self.cached_get(&key, &url).await? else {
            return Ok(Vec::new());
        };

        let detail: MbWorkDetail =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(detail
            .relations
            .into_iter()
            .filter_map(|rel| rel.recording)
            .map(|rec| RecordingRef {
                id: rec.id,
                title: rec.title,
            })
            .collect())
    }

    /// Recording detail with releases, artist credit, and artist relations.
    pub async fn recording_detail(
        &self,
        recording_id: &str,
    ) -> Result<Option<RecordingDetail>, ProviderError> {
        let key = CacheKey::entity(PROVIDER, "recordings", recording_id);
        let url = format!(
            "{}/recording/{}?inc=releases+artist-credits+artist-rels&fmt=json",
            self.base_url, recording_id
        );

        let Some(value) = self.cached_get(&key, &url).await? else {
            return Ok(None);
        };

        let recording: MbRecording =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(Some(recording.into()))
    }

    /// Release detail, used as the artist-rel fallback when recording detail
    /// carries none.
    pub async fn release_detail(
        &self,
        release_id: &str,
    ) -> Result<Option<ReleaseDetail>, ProviderError> {
        let key = CacheKey::entity(PROVIDER, "releases", release_id);
        let url = format!(
            "{}/release/{}?inc=artist-credits+recordings+artist-rels&fmt=json",
            self.base_url, release_id
        );

        let Some(value) = self.cached_get(&key, &url).await? else {
            return Ok(None);
        };

        let release: MbReleaseDetail =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(Some(release.into()))
    }

    /// Search artists by name (Lucene-escaped, quoted).
    pub async fn search_artists(&self, name: &str) -> Result<Vec<ArtistCandidate>, ProviderError> {
        let key = CacheKey::search(PROVIDER, &format!("artist_search_{}", name), name);

        if let CacheLookup::Hit(value) = self.cache.load(&key) {
            let cached: Vec<ArtistCandidate> =
                serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
            return Ok(cached);
        }

        let query = format!("artist:\"{}\"", escape_lucene(name));
        let url = format!(
            "{}/artist/?query={}&fmt=json&limit=5",
            self.base_url,
            urlencoding::encode(&query)
        );

        let value = self.get_json(&url).await?;
        let response: ArtistSearchResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;

        let candidates: Vec<ArtistCandidate> =
            response.artists.into_iter().map(Into::into).collect();

        if let Ok(value) = serde_json::to_value(&candidates) {
            self.cache.store(&key, &value);
        }

        Ok(candidates)
    }

    /// Artist detail by MBID.
    pub async fn artist_detail(&self, mbid: &str) -> Result<Option<ArtistDetail>, ProviderError> {
        let key = CacheKey::entity(PROVIDER, "artists", mbid);
        let url = format!("{}/artist/{}?fmt=json", self.base_url, mbid);

        let Some(value) = self.cached_get(&key, &url).await? else {
            return Ok(None);
        };

        let artist: MbArtist =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(Some(artist.into()))
    }
}

/// Escape Lucene query syntax characters in user-supplied terms.
fn escape_lucene(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '+' | '-' | '&' | '|' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '"'
                | '~' | '*' | '?' | ':'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lucene_escaping() {
        assert_eq!(escape_lucene("AC/DC"), "AC/DC");
        assert_eq!(escape_lucene("Who (band)?"), "Who \\(band\\)\\?");
        assert_eq!(escape_lucene("a+b"), "a\\+b");
    }

    #[test]
    fn recording_payload_converts_to_detail() {
        let raw = json!({
            "id": "rec-1",
            "title": "Take Five",
            "first-release-date": "1959-09-21",
            "artist-credit": [
                {"name": "The Dave Brubeck Quartet", "artist": {"id": "a-1", "name": "The Dave Brubeck Quartet"}}
            ],
            "releases": [
                {"id": "rel-1", "title": "Time Out", "date": "1959",
                 "artist-credit": [{"name": "The Dave Brubeck Quartet", "artist": {"id": "a-1"}}]}
            ],
            "relations": [
                {"type": "instrument", "artist": {"id": "a-2", "name": "Paul Desmond", "sort-name": "Desmond, Paul"},
                 "attributes": ["alto saxophone"]},
                {"type": "producer", "artist": {"id": "a-3", "name": "Teo Macero"}, "attributes": []}
            ]
        });

        let recording: MbRecording = serde_json::from_value(raw).unwrap();
        let detail: RecordingDetail = recording.into();

        assert_eq!(detail.recording_year(), Some(1959));
        assert_eq!(detail.releases.len(), 1);
        assert_eq!(detail.releases[0].release_year(), Some(1959));
        assert_eq!(detail.relations.len(), 2);
        assert_eq!(detail.relations[0].attributes, vec!["alto saxophone"]);
        assert_eq!(detail.relations[1].relation_type, "producer");
        assert_eq!(detail.artist_credit[0].name, "The Dave Brubeck Quartet");
    }

    #[test]
    fn relations_without_artist_are_dropped() {
        let raw = json!({
            "id": "rec-2",
            "title": "Stardust",
            "relations": [
                {"type": "work", "attributes": []}
            ]
        });

        let recording: MbRecording = serde_json::from_value(raw).unwrap();
        let detail: RecordingDetail = recording.into();
        assert!(detail.relations.is_empty());
    }
}
