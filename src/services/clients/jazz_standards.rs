//! JazzStandards.com client
//!
//! HTML scrape of the paginated top-1000 index and the per-song pages,
//! parsed tolerantly with `scraper`. Pages are cached with the short web-page
//! TTL. Recommended recordings come from the "Recommendations for this Tune"
//! section; the bold-element scan runs only when that section yields nothing.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use super::types::{IndexEntry, RecommendedRecording, SongPage};
use super::{RateGate, RetryPolicy};
use crate::error::ProviderError;
use crate::services::cache::{CacheKey, CacheLookup, ResponseCache};

const JAZZ_STANDARDS_BASE: &str = "https://www.jazzstandards.com";
const PROVIDER: &str = "jazzstandards";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);
const COOLDOWN: Duration = Duration::from_secs(120);

/// The editorial site blocks obvious bots; present a browser user agent.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

pub struct JazzStandardsClient {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<dyn ResponseCache>,
    gate: RateGate,
    retry: RetryPolicy,
}

fn composer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:Music by|Composed by)\s+([^,\n<]+)").unwrap())
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap())
}

fn recommendation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Z][^-\n(]+?)\s*[-\u{2013}]\s*([^(\n]+?)\s*\((\d{4})\)").unwrap())
}

fn bold_followup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\u{2013}-]\s*([^(]+?)\s*\((\d{4})\)").unwrap())
}

fn section_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Recommendations?\s+for\s+this\s+Tune").unwrap())
}

impl JazzStandardsClient {
    pub fn new(cache: Arc<dyn ResponseCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: JAZZ_STANDARDS_BASE.to_string(),
            cache,
            gate: RateGate::new(MIN_REQUEST_INTERVAL, COOLDOWN),
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
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

    /// Fetch one page of HTML through the cache. `Ok(None)` means 404.
    async fn fetch_page(&self, url: &str) -> Result<Option<String>, ProviderError> {
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
                self.cache.store_negative(&key);
                return Ok(None);
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

            let html = response
                .text()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))?;
            self.cache.store(&key, &serde_json::Value::String(html.clone()));
            return Ok(Some(html));
        }
    }

    /// Fetch the full top-1000 index (pages 1-10), deduplicated by URL.
    pub async fn list_all(&self) -> Result<Vec<IndexEntry>, ProviderError> {
        let mut urls = vec![format!("{}/compositions/index.htm", self.base_url)];
        for i in 2..=10 {
            urls.push(format!("{}/compositions/index{}.htm", self.base_url, i));
        }

        let mut entries: Vec<IndexEntry> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for (page_num, url) in urls.iter().enumerate() {
            let Some(html) = self.fetch_page(url).await? else {
                tracing::warn!("Index page {} missing: {}", page_num + 1, url);
                continue;
            };

            for entry in parse_index_page(&html, &self.base_url) {
                if seen.insert(entry.url.clone()) {
                    entries.push(entry);
                }
            }
        }

        tracing::info!("Found {} unique songs across index pages", entries.len());
        Ok(entries)
    }

    /// Locate and scrape the song page for a title, trying the site's URL
    /// patterns in order.
    pub async fn song_page(&self, song_name: &str) -> Result<Option<SongPage>, ProviderError> {
        let slug = normalize_for_url(song_name);
        if slug.is_empty() {
            return Ok(None);
        }
        let first_char = slug.chars().next().unwrap();

        let candidates = [
            format!("{}/compositions-{}/{}.htm", self.base_url, first_char, slug),
            format!("{}/compositions/{}.htm", self.base_url, slug),
            format!("{}/compositions-0/{}.htm", self.base_url, slug),
        ];

        for url in &candidates {
            if let Some(html) = self.fetch_page(url).await? {
                tracing::debug!("Found editorial page: {}", url);
                return Ok(Some(parse_song_page(&html, url)));
            }
        }

        tracing::debug!("No editorial page found for '{}'", song_name);
        Ok(None)
    }
}

/// Convert a song title to the site's URL slug: drop the leading article,
/// drop punctuation, join the words.
pub fn normalize_for_url(song_name: &str) -> String {
    let lower = song_name.to_lowercase();
    let stripped = lower
        .strip_prefix("the ")
        .or_else(|| lower.strip_prefix("a "))
        .or_else(|| lower.strip_prefix("an "))
        .unwrap_or(&lower);

    stripped
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn parse_index_page(html: &str, base_url: &str) -> Vec<IndexEntry> {
    let doc = Html::parse_document(html);
    let anchor = Selector::parse("a").expect("static selector");

    let mut entries = Vec::new();
    for a in doc.select(&anchor) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        if !href.contains("compositions") || !href.ends_with(".htm") {
            continue;
        }
        let title = a.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }

        let url = if href.starts_with("http") {
            href.to_string()
        } else {
            let trimmed = href.trim_start_matches("../").trim_start_matches("./");
            format!("{}/{}", base_url, trimmed.trim_start_matches('/'))
        };

        entries.push(IndexEntry { title, url });
    }
    entries
}

fn parse_song_page(html: &str, url: &str) -> SongPage {
    let doc = Html::parse_document(html);
    let text: String = doc.root_element().text().collect::<Vec<_>>().join(" ");

    let composer = composer_re()
        .captures(&text)
        .map(|c| c[1].trim().to_string());

    let year = year_re()
        .captures(&text)
        .and_then(|c| c[1].parse::<i32>().ok());

    let paragraph = Selector::parse("p").expect("static selector");
    let description = doc
        .select(&paragraph)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .find(|t| t.len() > 100)
        .map(|t| t.chars().take(500).collect());

    let mut recordings = extract_recommendations(&text);
    if recordings.is_empty() {
        recordings = extract_recordings_from_bold(&doc);
    }
    recordings.truncate(10);

    SongPage {
        url: url.to_string(),
        composer,
        year,
        description,
        recommended_recordings: recordings,
    }
}

/// Primary heuristic: the "Recommendations for this Tune" section, matching
/// "Artist - Album (Year)" entries in the text that follows the heading.
fn extract_recommendations(text: &str) -> Vec<RecommendedRecording> {
    let Some(m) = section_heading_re().find(text) else {
        return Vec::new();
    };

    let section: String = text[m.end()..].chars().take(3000).collect();
    let mut recordings = Vec::new();

    for caps in recommendation_re().captures_iter(&section) {
        let artist = caps[1].trim().to_string();
        let album = caps[2].trim().to_string();
        let year = caps[3].parse::<i32>().ok();

        if artist.len() > 2 && album.len() > 2 {
            recordings.push(RecommendedRecording {
                artist,
                album,
                year,
            });
        }
    }

    recordings
}

/// Fallback heuristic: bold artist names followed by "- Album (Year)" text.
fn extract_recordings_from_bold(doc: &Html) -> Vec<RecommendedRecording> {
    let bold = Selector::parse("b, strong").expect("static selector");
    let mut recordings = Vec::new();

    for el in doc.select(&bold) {
        let artist = el.text().collect::<String>().trim().to_string();
        if artist.len() <= 2 {
            continue;
        }

        let Some(sibling) = el.next_sibling() else {
            continue;
        };
        let next_text = match sibling.value() {
            Node::Text(t) => t.text.to_string(),
            Node::Element(_) => ElementRef::wrap(sibling)
                .map(|e| e.text().collect::<String>())
                .unwrap_or_default(),
            _ => String::new(),
        };

        if let Some(caps) = bold_followup_re().captures(&next_text) {
            let album = caps[1].trim().to_string();
            let year = caps[2].parse::<i32>().ok();
            if album.len() > 2 {
                recordings.push(RecommendedRecording {
                    artist,
                    album,
                    year,
                });
            }
        }
    }

    recordings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_normalization_strips_articles_and_punctuation() {
        assert_eq!(normalize_for_url("Take Five"), "takefive");
        assert_eq!(normalize_for_url("The Song Is You"), "songisyou");
        assert_eq!(normalize_for_url("'Round Midnight"), "roundmidnight");
        assert_eq!(normalize_for_url("A Night in Tunisia"), "nightintunisia");
        assert_eq!(normalize_for_url("All of Me, or..."), "allofmeor");
    }

    #[test]
    fn song_page_parsing_extracts_fields() {
        let html = r#"
        <html><body>
          <p>short intro</p>
          <p>Take Five is a jazz standard composed in 1959 and released on the
          album Time Out. It became famous for its distinctive quintuple meter
          and remains one of the best-known jazz recordings of all time.</p>
          <p>Music by Paul Desmond, first recorded 1959.</p>
          <h3>Recommendations for this Tune</h3>
          <p>Dave Brubeck - Time Out (1959)
          Al Jarreau - Look To The Rainbow (1977)</p>
        </body></html>"#;

        let page = parse_song_page(html, "https://example.test/takefive.htm");
        assert_eq!(page.composer.as_deref(), Some("Paul Desmond"));
        assert_eq!(page.year, Some(1959));
        assert!(page.description.is_some());
        assert_eq!(page.recommended_recordings.len(), 2);
        assert_eq!(page.recommended_recordings[0].artist, "Dave Brubeck");
        assert_eq!(page.recommended_recordings[0].album, "Time Out");
        assert_eq!(page.recommended_recordings[0].year, Some(1959));
    }

    #[test]
    fn bold_scan_only_runs_when_section_is_absent() {
        let html = r#"
        <html><body>
          <p>Composed by Thelonious Monk in 1944, this piece needs a longer
          description paragraph to be picked up by the description extractor,
          which requires more than one hundred characters of text.</p>
          <b>Miles Davis</b> - 'Round About Midnight (1957)
        </body></html>"#;

        let page = parse_song_page(html, "https://example.test/roundmidnight.htm");
        assert_eq!(page.recommended_recordings.len(), 1);
        assert_eq!(page.recommended_recordings[0].artist, "Miles Davis");
        assert_eq!(page.recommended_recordings[0].year, Some(1957));
    }

    #[test]
    fn index_parsing_resolves_relative_links() {
        let html = r#"
        <html><body>
          <a href="../compositions-0/takefive.htm">Take Five</a>
          <a href="/compositions-s/stardust.htm">Stardust</a>
          <a href="/about.htm">About</a>
        </body></html>"#;

        let entries = parse_index_page(html, "https://www.jazzstandards.com");
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].url,
            "https://www.jazzstandards.com/compositions-0/takefive.htm"
        );
        assert_eq!(entries[1].title, "Stardust");
    }
}
