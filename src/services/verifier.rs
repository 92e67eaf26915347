//! Reference verifier.
//!
//! Given an external reference URL claimed to describe an in-store
//! performer, fetch the page and score how likely it is to actually be about
//! that musician. Disambiguation landings and wrong-profession profiles are
//! hard rejections; positive evidence accumulates from the heading, the
//! infobox, music keywords, life dates, and sample-title mentions.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::services::clients::WikimediaClient;

/// Minimum score for a reference to be accepted.
const VALID_THRESHOLD: u32 = 50;
/// Score at which an accepted reference is high-confidence.
const HIGH_THRESHOLD: u32 = 70;
/// Below this, a rejection is very_low rather than low confidence.
const LOW_FLOOR: u32 = 30;

/// Music terms that carry strong signal on their own.
const SPECIFIC_INFOBOX_TERMS: [&str; 20] = [
    "jazz", "musician", "singer", "vocalist", "pianist", "composer", "saxophonist", "trumpeter",
    "bassist", "drummer", "guitarist", "bandleader", "blues", "soul", "r&b", "gospel", "folk",
    "instruments", "genres", "labels",
];

const SPECIFIC_CONTENT_KEYWORDS: [&str; 24] = [
    "jazz", "musician", "singer", "vocalist", "pianist", "saxophonist", "trumpeter", "bassist",
    "drummer", "guitarist", "composer", "bandleader", "album", "recording", "blues", "soul",
    "r&b", "gospel", "folk", "orchestra", "symphony", "concerto", "sonata", "opera",
];

/// Terms that could be about anything; they count only lightly.
const GENERIC_CONTENT_KEYWORDS: [&str; 5] = ["music", "song", "performance", "concert", "stage"];

/// Disambiguating parentheticals that indicate a non-musician profile.
const NON_MUSICIAN_TERMS: [&str; 30] = [
    "basketball", "football", "baseball", "hockey", "soccer", "cricket", "athlete", "sports",
    "player", "coach", "politician", "politics", "senator", "congressman", "mayor", "businessman",
    "business", "entrepreneur", "ceo", "executive", "actor", "actress", "film", "television",
    "writer", "author", "journalist", "poet", "scientist", "military",
];

/// Musician terms that keep a parenthetical from triggering rejection.
const MUSICIAN_TERMS: [&str; 17] = [
    "musician", "singer", "vocalist", "pianist", "guitarist", "bassist", "drummer",
    "saxophonist", "trumpeter", "composer", "conductor", "bandleader", "jazz", "blues", "rock",
    "folk", "country",
];

fn may_refer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^.]*?\bmay refer to\b").unwrap())
}

fn birth_pattern_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((?:born\s+)?\d{4}").unwrap())
}

fn trailing_parenthetical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^)]+)\)\s*$").unwrap())
}

/// Confidence attached to a verification verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    VeryLow,
    Low,
    Medium,
    High,
    Certain,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::VeryLow => "very_low",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
            Confidence::Certain => "certain",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Side information that strengthens or weakens a match.
#[derive(Debug, Clone, Default)]
pub struct VerificationContext {
    pub birth_date: Option<NaiveDate>,
    pub death_date: Option<NaiveDate>,
    pub sample_titles: Vec<String>,
}

/// Verdict for one candidate reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub valid: bool,
    pub confidence: Confidence,
    pub reason: String,
    pub score: u32,
}

impl Verification {
    fn rejected(reason: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            valid: false,
            confidence,
            reason: reason.into(),
            score: 0,
        }
    }
}

/// Word-boundary matching. "opera" must not match inside "operating".
pub fn word_in_text(term: &str, text: &str) -> bool {
    let pattern = format!(r"\b{}\b", regex::escape(term));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

/// First `n` characters of a string (not bytes; provider text is UTF-8).
fn prefix_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

/// Verifier over the reference archive's pages.
pub struct ReferenceVerifier {
    wiki: WikimediaClient,
}

impl ReferenceVerifier {
    pub fn new(wiki: WikimediaClient) -> Self {
        Self { wiki }
    }

    /// Fetch and evaluate a candidate reference URL.
    pub async fn verify(
        &self,
        performer_name: &str,
        url: &str,
        context: &VerificationContext,
    ) -> Result<Verification, ProviderError> {
        tracing::debug!("Verifying reference: {}", url);

        let Some(html) = self.wiki.page_html(url).await? else {
            return Ok(Verification::rejected(
                "Failed to fetch reference page",
                Confidence::Certain,
            ));
        };

        Ok(evaluate_page(&html, performer_name, context))
    }
}

/// Score a fetched page against a performer. Pure so it can be tested on
/// canned HTML.
pub fn evaluate_page(
    html: &str,
    performer_name: &str,
    context: &VerificationContext,
) -> Verification {
    let doc = Html::parse_document(html);

    let heading_sel = Selector::parse("h1#firstHeading, h1").expect("static selector");
    let content_sel =
        Selector::parse("div#mw-content-text, div.mw-parser-output").expect("static selector");
    let infobox_sel = Selector::parse("table.infobox").expect("static selector");
    let list_sel = Selector::parse("ul").expect("static selector");

    let heading = doc
        .select(&heading_sel)
        .next()
        .map(|h| h.text().collect::<String>().trim().to_string());

    let page_text = doc
        .select(&content_sel)
        .next()
        .map(|c| c.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|| doc.root_element().text().collect::<Vec<_>>().join(" "))
        .to_lowercase();

    // Hard negative: an explicit disambiguation landing.
    if let Some(heading) = &heading {
        if heading.ends_with("(disambiguation)") {
            return Verification::rejected("Page is a disambiguation page", Confidence::High);
        }
    }

    // Hard negative: "[Name] may refer to:" in the lead.
    if may_refer_re().is_match(&prefix_chars(&page_text, 800)) {
        return Verification::rejected("Page is a disambiguation page", Confidence::High);
    }

    // Hard negative: the first lists enumerate several people with life
    // years, the shape of an unlabeled disambiguation page.
    let list_text: String = doc
        .select(&list_sel)
        .take(2)
        .map(|ul| ul.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ");
    let birth_patterns = birth_pattern_re().find_iter(&list_text).count();
    if birth_patterns >= 3 {
        return Verification::rejected(
            format!(
                "Page appears to be a disambiguation page (lists {} different people)",
                birth_patterns
            ),
            Confidence::High,
        );
    }

    let mut score = 0u32;
    let mut reasons: Vec<String> = Vec::new();

    if let Some(heading) = &heading {
        // A parenthetical naming another profession is a hard rejection,
        // unless it also names a musician term ("singer-songwriter").
        if let Some(caps) = trailing_parenthetical_re().captures(heading) {
            let term = caps[1].to_lowercase();
            let non_musician = NON_MUSICIAN_TERMS.iter().any(|t| term.contains(t));
            let musician = MUSICIAN_TERMS.iter().any(|t| term.contains(t));
            if non_musician && !musician {
                return Verification::rejected(
                    format!("Page is about a {}, not a musician", term),
                    Confidence::High,
                );
            }
        }

        let page_name = trailing_parenthetical_re()
            .replace(heading, "")
            .trim()
            .to_lowercase();
        let wanted = performer_name.to_lowercase();

        if page_name == wanted {
            score += 30;
            reasons.push("Exact name match".to_string());
        } else if page_name.contains(&wanted) || wanted.contains(&page_name) {
            score += 15;
            reasons.push("Partial name match".to_string());
        } else {
            reasons.push(format!(
                "Name mismatch: expected '{}', page is '{}'",
                performer_name, heading
            ));
        }
    }

    // Infobox with specific music terms is the strongest single signal.
    if let Some(infobox) = doc.select(&infobox_sel).next() {
        let infobox_text = infobox.text().collect::<Vec<_>>().join(" ").to_lowercase();
        let found: Vec<&str> = SPECIFIC_INFOBOX_TERMS
            .iter()
            .copied()
            .filter(|t| word_in_text(t, &infobox_text))
            .collect();
        if !found.is_empty() {
            score += 40;
            reasons.push(format!("Infobox contains music terms: {}", found[..found.len().min(3)].join(", ")));
        } else if infobox_text.contains("occupation") {
            score += 10;
            reasons.push("Infobox present but no specific music terms".to_string());
        }
    }

    let lead = prefix_chars(&page_text, 2000);

    let found_specific: Vec<&str> = SPECIFIC_CONTENT_KEYWORDS
        .iter()
        .copied()
        .filter(|kw| word_in_text(kw, &lead))
        .collect();
    if !found_specific.is_empty() {
        score += 20;
        reasons.push(format!(
            "Found music keywords: {}",
            found_specific[..found_specific.len().min(3)].join(", ")
        ));
    } else {
        let found_generic: Vec<&str> = GENERIC_CONTENT_KEYWORDS
            .iter()
            .copied()
            .filter(|kw| word_in_text(kw, &lead))
            .collect();
        if !found_generic.is_empty() {
            score += 5;
            reasons.push(format!(
                "Found generic music keywords: {}",
                found_generic[..found_generic.len().min(2)].join(", ")
            ));
        }
    }

    if let Some(birth) = context.birth_date {
        let year = birth.year().to_string();
        if lead.contains(&year) {
            score += 25;
            reasons.push(format!("Birth year {} found on page", year));
        }
    }

    if let Some(death) = context.death_date {
        let year = death.year().to_string();
        if lead.contains(&year) {
            score += 20;
            reasons.push(format!("Death year {} found on page", year));
        }
    }

    let mentioned: Vec<&String> = context
        .sample_titles
        .iter()
        .filter(|t| !t.is_empty() && page_text.contains(&t.to_lowercase()))
        .collect();
    if !mentioned.is_empty() {
        score += 25;
        let names: Vec<&str> = mentioned.iter().take(2).map(|s| s.as_str()).collect();
        reasons.push(format!("Found song references: {}", names.join(", ")));
    }

    if score >= VALID_THRESHOLD {
        Verification {
            valid: true,
            confidence: if score >= HIGH_THRESHOLD {
                Confidence::High
            } else {
                Confidence::Medium
            },
            reason: reasons.join("; "),
            score,
        }
    } else {
        Verification {
            valid: false,
            confidence: if score >= LOW_FLOOR {
                Confidence::Low
            } else {
                Confidence::VeryLow
            },
            reason: format!(
                "Insufficient evidence of correct performer (score: {}): {}",
                score,
                reasons.join("; ")
            ),
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> VerificationContext {
        VerificationContext::default()
    }

    #[test]
    fn word_boundaries_are_enforced() {
        assert!(!word_in_text("opera", "an operating system engineer"));
        assert!(word_in_text("opera", "sang at the opera house"));
        assert!(word_in_text("r&b", "blends r&b and soul"));
    }

    #[test]
    fn wrong_profession_parenthetical_is_rejected() {
        let html = r#"
        <html><body>
          <h1 id="firstHeading">Sam Jones (basketball)</h1>
          <div id="mw-content-text">
            <p>Sam Jones is an American former professional basketball player,
            a ten-time champion whose recordings of game-winning shots are
            legendary. Music fans sometimes confuse him with the bassist.</p>
          </div>
        </body></html>"#;

        let verdict = evaluate_page(html, "Sam Jones", &ctx());
        assert!(!verdict.valid);
        assert_eq!(verdict.confidence, Confidence::High);
        assert_eq!(verdict.score, 0);
    }

    #[test]
    fn disambiguation_heading_is_rejected() {
        let html = r#"
        <html><body>
          <h1 id="firstHeading">Sam Jones (disambiguation)</h1>
          <div id="mw-content-text"><p>Jazz bassist and more.</p></div>
        </body></html>"#;

        let verdict = evaluate_page(html, "Sam Jones", &ctx());
        assert!(!verdict.valid);
        assert_eq!(verdict.confidence, Confidence::High);
    }

    #[test]
    fn may_refer_to_lead_is_rejected() {
        let html = r#"
        <html><body>
          <h1 id="firstHeading">Sam Jones</h1>
          <div id="mw-content-text"><p>Sam Jones may refer to:</p></div>
        </body></html>"#;

        let verdict = evaluate_page(html, "Sam Jones", &ctx());
        assert!(!verdict.valid);
        assert_eq!(verdict.reason, "Page is a disambiguation page");
    }

    #[test]
    fn name_list_with_life_years_is_rejected() {
        let html = r#"
        <html><body>
          <h1 id="firstHeading">Sam Jones</h1>
          <div id="mw-content-text">
            <ul>
              <li>Sam Jones (1924-1981), jazz bassist</li>
              <li>Sam Jones (born 1933), basketball player</li>
              <li>Sam Jones (1898-1966), pitcher</li>
            </ul>
          </div>
        </body></html>"#;

        let verdict = evaluate_page(html, "Sam Jones", &ctx());
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("disambiguation"));
    }

    #[test]
    fn musician_page_with_strong_signals_is_accepted() {
        let html = r#"
        <html><body>
          <h1 id="firstHeading">Paul Desmond</h1>
          <div id="mw-content-text">
            <table class="infobox"><tr><td>Genres</td><td>Jazz</td></tr>
              <tr><td>Instruments</td><td>Alto saxophone</td></tr></table>
            <p>Paul Desmond (born 1924) was an American jazz saxophonist and
            composer, best known for the recording of Take Five with the Dave
            Brubeck Quartet.</p>
          </div>
        </body></html>"#;

        let context = VerificationContext {
            birth_date: NaiveDate::from_ymd_opt(1924, 11, 25),
            death_date: None,
            sample_titles: vec!["Take Five".to_string()],
        };

        let verdict = evaluate_page(html, "Paul Desmond", &context);
        assert!(verdict.valid);
        assert_eq!(verdict.confidence, Confidence::High);
        // name 30 + infobox 40 + keywords 20 + birth year 25 + song 25
        assert_eq!(verdict.score, 140);
    }

    #[test]
    fn weak_page_is_rejected_with_low_confidence() {
        let html = r#"
        <html><body>
          <h1 id="firstHeading">John Smith</h1>
          <div id="mw-content-text">
            <p>John Smith is a person who once attended a concert.</p>
          </div>
        </body></html>"#;

        let verdict = evaluate_page(html, "Paul Desmond", &ctx());
        assert!(!verdict.valid);
        assert_eq!(verdict.confidence, Confidence::VeryLow);
    }
}
