//! Wikipedia / Wikimedia client
//!
//! Two jobs: fetching article HTML for the reference verifier (short page
//! TTL), and pulling licensed performer portraits through the MediaWiki
//! `action=query` API, ending at `prop=imageinfo` for license and
//! attribution metadata.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use super::types::PortraitInfo;
use super::{RateGate, RetryPolicy, USER_AGENT};
use crate::error::ProviderError;
use crate::services::cache::{CacheKey, CacheLookup, ResponseCache};

const WIKIPEDIA_API_BASE: &str = "https://en.wikipedia.org/w/api.php";
const PROVIDER: &str = "wikipedia";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(500);
const COOLDOWN: Duration = Duration::from_secs(120);

pub struct WikimediaClient {
    http: reqwest::Client,
    api_base: String,
    cache: Arc<dyn ResponseCache>,
    gate: RateGate,
    retry: RetryPolicy,
}

fn wiki_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/wiki/(.+)$").unwrap())
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryBody>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default)]
    search: Vec<SearchHit>,
    #[serde(default)]
    pages: std::collections::HashMap<String, PageInfo>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    title: Option<String>,
    original: Option<ImagePointer>,
    fullurl: Option<String>,
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct ImagePointer {
    source: String,
    width: Option<i32>,
    height: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    width: Option<i32>,
    height: Option<i32>,
    #[serde(default)]
    extmetadata: std::collections::HashMap<String, MetadataValue>,
}

#[derive(Debug, Deserialize)]
struct MetadataValue {
    value: Option<serde_json::Value>,
}

impl MetadataValue {
    fn as_text(&self) -> Option<String> {
        self.value.as_ref().and_then(|v| v.as_str()).map(String::from)
    }
}

impl WikimediaClient {
    pub fn new(cache: Arc<dyn ResponseCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            api_base: WIKIPEDIA_API_BASE.to_string(),
            cache,
            gate: RateGate::new(MIN_REQUEST_INTERVAL, COOLDOWN),
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_tuning(mut self, min_interval: Duration, retry: RetryPolicy) -> Self {
        self.gate = RateGate::new(min_interval, COOLDOWN);
        self.retry = retry;
        self
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, ProviderError> {
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

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt < self.retry.max_retries {
                    tokio::time::sleep(self.retry.backoff_delay(attempt)).await;
                    attempt += 1;
                    continue;
                }
                self.gate.enter_cooldown().await;
                return Err(ProviderError::RateLimited { retry_after: None });
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Upstream {
                    status: status.as_u16(),
                    body,
                });
            }

            return Ok(response);
        }
    }

    /// Fetch article HTML for the verifier. `Ok(None)` means the page does
    /// not exist; the miss is cached.
    pub async fn page_html(&self, url: &str) -> Result<Option<String>, ProviderError> {
        let name = url.rsplit('/').next().unwrap_or("page");
        let key = CacheKey {
            provider: PROVIDER,
            kind: "pages",
            name: name.to_string(),
            seed: url.to_string(),
        };

        match self.cache.load(&key) {
            CacheLookup::Hit(value) => {
                if let Some(html) = value.as_str() {
                    return Ok(Some(html.to_string()));
                }
            }
            CacheLookup::NegativeHit => return Ok(None),
            CacheLookup::Miss => {}
        }

        match self.get(url).await {
            Ok(response) => {
                let html = response
                    .text()
                    .await
                    .map_err(|e| ProviderError::Parse(e.to_string()))?;
                self.cache.store(&key, &serde_json::Value::String(html.clone()));
                Ok(Some(html))
            }
            Err(ProviderError::NotFound) => {
                self.cache.store_negative(&key);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn api_query(&self, params: &str) -> Result<QueryResponse, ProviderError> {
        let url = format!("{}?{}", self.api_base, params);
        let response = self.get(&url).await?;
        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    /// Resolve the article title: from a known article URL when available,
    /// otherwise via a one-hit search.
    async fn resolve_page_title(
        &self,
        performer_name: &str,
        article_url: Option<&str>,
    ) -> Result<Option<String>, ProviderError> {
        if let Some(url) = article_url {
            if let Some(caps) = wiki_title_re().captures(url) {
                let title = urlencoding::decode(&caps[1])
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| caps[1].to_string());
                return Ok(Some(title));
            }
            tracing::warn!("Could not extract page title from URL: {}", url);
        }

        let params = format!(
            "action=query&format=json&list=search&srlimit=1&srsearch={}",
            urlencoding::encode(performer_name)
        );
        let response = self.api_query(&params).await?;
        Ok(response
            .query
            .and_then(|q| q.search.into_iter().next())
            .map(|hit| hit.title))
    }

    /// Fetch the lead portrait for a performer, with license/attribution
    /// pulled from the file's `imageinfo` extmetadata.
    pub async fn portrait(
        &self,
        performer_name: &str,
        article_url: Option<&str>,
    ) -> Result<Option<PortraitInfo>, ProviderError> {
        let key = CacheKey::search(
            PROVIDER,
            &format!("portrait_{}", performer_name),
            &format!("{}||{}", performer_name, article_url.unwrap_or("")),
        );

        match self.cache.load(&key) {
            CacheLookup::Hit(value) => {
                let info = serde_json::from_value(value)
                    .map_err(|e| ProviderError::Parse(e.to_string()))?;
                return Ok(Some(info));
            }
            CacheLookup::NegativeHit => return Ok(None),
            CacheLookup::Miss => {}
        }

        let Some(page_title) = self.resolve_page_title(performer_name, article_url).await? else {
            tracing::debug!("No article found for {}", performer_name);
            self.cache.store_negative(&key);
            return Ok(None);
        };

        // Lead image of the article.
        let params = format!(
            "action=query&format=json&prop=pageimages%7Cinfo&piprop=original&inprop=url&titles={}",
            urlencoding::encode(&page_title)
        );
        let response = self.api_query(&params).await?;

        let page = response
            .query
            .and_then(|q| q.pages.into_values().next());
        let Some(page) = page else {
            self.cache.store_negative(&key);
            return Ok(None);
        };
        let Some(original) = page.original else {
            tracing::debug!("No lead image on article for {}", performer_name);
            self.cache.store_negative(&key);
            return Ok(None);
        };

        let source_page_url = page
            .fullurl
            .clone()
            .or_else(|| Some(format!("https://en.wikipedia.org/wiki/{}", page_title)));

        // License and attribution from the file description page.
        let filename = original.source.rsplit('/').next().unwrap_or_default();
        let params = format!(
            "action=query&format=json&prop=imageinfo&iiprop=extmetadata%7Csize&titles=File%3A{}",
            urlencoding::encode(filename)
        );
        let license_response = self.api_query(&params).await?;

        let mut license_raw = None;
        let mut attribution = None;
        let mut width = original.width;
        let mut height = original.height;

        if let Some(file_page) = license_response
            .query
            .and_then(|q| q.pages.into_values().next())
        {
            if let Some(info) = file_page.imageinfo.into_iter().next() {
                license_raw = info.extmetadata.get("License").and_then(|m| m.as_text());
                attribution = info
                    .extmetadata
                    .get("Artist")
                    .and_then(|m| m.as_text())
                    .or_else(|| info.extmetadata.get("Credit").and_then(|m| m.as_text()));
                width = info.width.or(width);
                height = info.height.or(height);
            }
        }

        let info = PortraitInfo {
            url: original.source,
            caption: page.title,
            license_raw,
            attribution,
            source_page_url,
            width,
            height,
        };

        if let Ok(value) = serde_json::to_value(&info) {
            self.cache.store(&key, &value);
        }

        tracing::info!("Found portrait for {}: {}", performer_name, info.url);
        Ok(Some(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_title_extraction_from_article_url() {
        let caps = wiki_title_re()
            .captures("https://en.wikipedia.org/wiki/Miles_Davis")
            .unwrap();
        assert_eq!(&caps[1], "Miles_Davis");
    }

    #[test]
    fn metadata_value_reads_string_payloads() {
        let value = MetadataValue {
            value: Some(serde_json::json!("CC BY-SA 3.0")),
        };
        assert_eq!(value.as_text().as_deref(), Some("CC BY-SA 3.0"));

        let numeric = MetadataValue {
            value: Some(serde_json::json!(42)),
        };
        assert_eq!(numeric.as_text(), None);
    }
}
