//! Entity resolution: normalization and fuzzy scoring.
//!
//! Titles and artist names arrive from five providers with different
//! apostrophes, dashes, articles, and ensemble suffixes. Everything here is
//! pure and table-driven; the tables are immutable process-wide data.

use std::sync::OnceLock;

use regex::Regex;

/// Minimum token-sort score accepted for automatic import matching.
pub const AUTO_MATCH_THRESHOLD: u8 = 85;

/// Looser threshold used by streaming-link search, where edition suffixes
/// ("Legacy Edition") are common; paired with substring containment.
pub const STREAMING_MATCH_THRESHOLD: u8 = 60;

/// Apostrophe variants mapped to U+2019.
const APOSTROPHE_VARIANTS: [char; 4] = ['\u{0027}', '\u{0060}', '\u{00B4}', '\u{2018}'];
const APOSTROPHE_REVERSED: char = '\u{201B}';

/// Dash variants (en, em, minus) mapped to hyphen-minus.
const DASH_VARIANTS: [char; 3] = ['\u{2013}', '\u{2014}', '\u{2212}'];

/// Ensemble suffix patterns, longest first so "and his orchestra" wins over
/// "orchestra".
fn ensemble_suffix_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\s+and\s+(?:his|her)\s+orchestra\b.*$",
            r"\s+and\s+(?:his|her)\s+big\s+band\b.*$",
            r"\s+and\s+(?:his|her)\s+band\b.*$",
            r"\s+and\s+(?:his|her)\s+quintet\b.*$",
            r"\s+and\s+(?:his|her)\s+quartet\b.*$",
            r"\s+and\s+(?:his|her)\s+trio\b.*$",
            r"\s+orchestra\b.*$",
            r"\s+big\s+band\b.*$",
            r"\s+band\b.*$",
            r"\s+ensemble\b.*$",
            r"\s+trio\b.*$",
            r"\s+quartet\b.*$",
            r"\s+quintet\b.*$",
            r"\s+sextet\b.*$",
            r"\s+septet\b.*$",
            r"\s+octet\b.*$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

fn parenthetical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").unwrap())
}

/// Canonical title normalization: lowercase, unify apostrophes to U+2019 and
/// dashes to hyphen-minus, strip leading articles, collapse whitespace.
/// Idempotent: `normalize_title(normalize_title(x)) == normalize_title(x)`.
pub fn normalize_title(title: &str) -> String {
    let mut normalized: String = title
        .to_lowercase()
        .chars()
        .map(|c| {
            if APOSTROPHE_VARIANTS.contains(&c) || c == APOSTROPHE_REVERSED {
                '\u{2019}'
            } else if DASH_VARIANTS.contains(&c) {
                '-'
            } else {
                c
            }
        })
        .collect();

    normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    // Strip leading articles repeatedly so the result is a fixed point
    // ("The A Train" style titles notwithstanding).
    loop {
        let stripped = ["the ", "a ", "an "]
            .iter()
            .find_map(|article| normalized.strip_prefix(article));
        match stripped {
            Some(rest) => normalized = rest.trim_start().to_string(),
            None => break,
        }
    }

    normalized
}

/// Matching variants for a title, in order of preference: full normalized,
/// parentheticals removed, before the first comma, spaces removed (so
/// "Stardust" matches "Star Dust").
pub fn title_variants(title: &str) -> Vec<String> {
    let mut variants = Vec::new();

    let full = normalize_title(title);
    if !full.is_empty() {
        variants.push(full.clone());
    }

    let no_parens = normalize_title(&parenthetical_re().replace_all(title, ""));
    if !no_parens.is_empty() && !variants.contains(&no_parens) {
        variants.push(no_parens);
    }

    if let Some(before_comma) = title.split(',').next() {
        if before_comma.len() != title.len() {
            let normalized = normalize_title(before_comma);
            if !normalized.is_empty() && !variants.contains(&normalized) {
                variants.push(normalized);
            }
        }
    }

    if !full.is_empty() {
        let no_spaces: String = full.chars().filter(|c| *c != ' ').collect();
        if no_spaces != full && !variants.contains(&no_spaces) {
            variants.push(no_spaces);
        }
    }

    variants
}

/// Strip ensemble suffixes from an artist credit to get the core name:
/// "Ahmad Jamal Trio" -> "ahmad jamal",
/// "Gene Krupa and His Orchestra" -> "gene krupa".
pub fn artist_core_name(name: &str) -> String {
    let mut core = name.to_lowercase().trim().to_string();
    for pattern in ensemble_suffix_patterns() {
        core = pattern.replace(&core, "").into_owned();
    }
    core.trim().to_string()
}

/// The group-leader rule: an individual performer leads an ensemble credit
/// when the credit's core name equals the performer's name. Leading "the"
/// is ignored on both sides so "The Dave Brubeck Quartet" resolves to
/// Dave Brubeck.
pub fn is_group_leader(performer_name: &str, credit_name: &str) -> bool {
    if performer_name.is_empty() || credit_name.is_empty() {
        return false;
    }
    let strip_article = |s: &str| s.strip_prefix("the ").map(str::to_string).unwrap_or_else(|| s.to_string());

    let performer = strip_article(performer_name.to_lowercase().trim());
    let core = strip_article(&artist_core_name(credit_name));
    performer == core
}

/// Token-sort similarity in [0, 100]: both sides are lowercased, tokenized,
/// sorted, and rejoined before a normalized Levenshtein comparison, so word
/// order does not matter.
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    let sort_tokens = |s: &str| {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };

    let a_sorted = sort_tokens(&a.to_lowercase());
    let b_sorted = sort_tokens(&b.to_lowercase());

    if a_sorted == b_sorted {
        return 100;
    }

    let max_len = a_sorted.chars().count().max(b_sorted.chars().count());
    if max_len == 0 {
        return 100;
    }

    let distance = levenshtein::levenshtein(&a_sorted, &b_sorted);
    let similarity = 1.0 - (distance as f64 / max_len as f64);
    (similarity.max(0.0) * 100.0).round() as u8
}

/// Best score across the variant sets of two titles. Exact variant equality
/// is 100; otherwise the best token-sort ratio.
pub fn best_title_score(a: &str, b: &str) -> u8 {
    let a_variants = title_variants(a);
    let b_variants = title_variants(b);

    let mut best = 0u8;
    for av in &a_variants {
        for bv in &b_variants {
            if av == bv {
                return 100;
            }
            best = best.max(token_sort_ratio(av, bv));
        }
    }
    best
}

/// Streaming-link title acceptance: loose score, or substring containment in
/// either direction ("Kind of Blue" vs "Kind of Blue (Legacy Edition)").
pub fn streaming_titles_match(a: &str, b: &str) -> bool {
    let a_norm = normalize_title(a);
    let b_norm = normalize_title(b);
    if a_norm.is_empty() || b_norm.is_empty() {
        return false;
    }
    if a_norm.contains(&b_norm) || b_norm.contains(&a_norm) {
        return true;
    }
    token_sort_ratio(&a_norm, &b_norm) >= STREAMING_MATCH_THRESHOLD
}

/// How an in-store entity was matched during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    ExternalId,
    ExactName,
    Fuzzy,
    Created,
}

/// Score an external artist candidate against a wanted name, using the
/// candidate's birth year as a secondary signal when the caller knows one.
pub fn score_artist_candidate(
    wanted_name: &str,
    candidate_name: &str,
    candidate_begin_year: Option<i32>,
    wanted_birth_year: Option<i32>,
) -> u8 {
    let mut score = token_sort_ratio(wanted_name, candidate_name);

    if let (Some(wanted), Some(got)) = (wanted_birth_year, candidate_begin_year) {
        if wanted == got {
            score = score.saturating_add(10).min(100);
        } else {
            score = score.saturating_sub(20);
        }
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_idempotent() {
        for title in [
            "'Round Midnight",
            "The Song Is You",
            "Take the \u{2018}A\u{2019} Train",
            "St. Louis Blues\u{2014}Revisited",
            "  A  Night   in Tunisia ",
        ] {
            let once = normalize_title(title);
            assert_eq!(normalize_title(&once), once, "not idempotent for {title:?}");
        }
    }

    #[test]
    fn apostrophe_variants_normalize_to_the_same_string() {
        // Straight apostrophe vs right single quotation mark.
        let stored = "'Round Midnight";
        let provider = "\u{2019}Round Midnight";
        assert_eq!(normalize_title(stored), normalize_title(provider));

        // Backtick and acute accent variants too.
        assert_eq!(normalize_title("`Round Midnight"), normalize_title(stored));
        assert_eq!(normalize_title("\u{00B4}Round Midnight"), normalize_title(stored));
    }

    #[test]
    fn dash_variants_collapse_to_hyphen() {
        assert_eq!(
            normalize_title("Blues\u{2013}March"),
            normalize_title("Blues-March")
        );
        assert_eq!(
            normalize_title("Blues\u{2014}March"),
            normalize_title("Blues\u{2212}March")
        );
    }

    #[test]
    fn leading_articles_are_stripped() {
        assert_eq!(normalize_title("The Nearness of You"), "nearness of you");
        assert_eq!(normalize_title("A Foggy Day"), "foggy day");
        assert_eq!(normalize_title("An Affair to Remember"), "affair to remember");
    }

    #[test]
    fn variants_cover_parens_commas_and_compound_words() {
        let variants = title_variants("Autumn Leaves (Les Feuilles Mortes)");
        assert!(variants.contains(&"autumn leaves (les feuilles mortes)".to_string()));
        assert!(variants.contains(&"autumn leaves".to_string()));

        let variants = title_variants("All of Me, or How I Learned");
        assert!(variants.contains(&"all of me".to_string()));

        // Spaces-removed variant equates Stardust and Star Dust.
        let a = title_variants("Stardust");
        let b = title_variants("Star Dust");
        assert!(a.iter().any(|v| b.contains(v)));
        assert_eq!(best_title_score("Stardust", "Star Dust"), 100);
    }

    #[test]
    fn ensemble_suffix_stripping() {
        assert_eq!(artist_core_name("Ahmad Jamal Trio"), "ahmad jamal");
        assert_eq!(artist_core_name("Gene Krupa and His Orchestra"), "gene krupa");
        assert_eq!(artist_core_name("Count Basie Big Band"), "count basie");
        assert_eq!(artist_core_name("Art Blakey Quintet"), "art blakey");
        assert_eq!(artist_core_name("Maria Schneider and Her Orchestra"), "maria schneider");
        assert_eq!(artist_core_name("Miles Davis"), "miles davis");
    }

    #[test]
    fn group_leader_detection() {
        assert!(is_group_leader("Ahmad Jamal", "Ahmad Jamal Trio"));
        assert!(is_group_leader("Gene Krupa", "Gene Krupa and His Orchestra"));
        assert!(is_group_leader("Dave Brubeck", "The Dave Brubeck Quartet"));
        assert!(!is_group_leader("Israel Crosby", "Ahmad Jamal Trio"));
        assert!(!is_group_leader("", "Ahmad Jamal Trio"));
    }

    #[test]
    fn token_sort_ignores_word_order() {
        assert_eq!(token_sort_ratio("Davis Miles", "Miles Davis"), 100);
        assert!(token_sort_ratio("Kind of Blue", "Kind of Blues") >= AUTO_MATCH_THRESHOLD);
        assert!(token_sort_ratio("Take Five", "Giant Steps") < STREAMING_MATCH_THRESHOLD);
    }

    #[test]
    fn streaming_match_accepts_edition_suffixes() {
        assert!(streaming_titles_match(
            "Kind of Blue",
            "Kind of Blue (Legacy Edition)"
        ));
        assert!(streaming_titles_match("Time Out", "Time Out"));
        assert!(!streaming_titles_match("Time Out", "Blue Train"));
    }

    #[test]
    fn artist_candidate_scoring_uses_birth_year_signal() {
        let base = score_artist_candidate("Sam Jones", "Sam Jones", None, None);
        assert_eq!(base, 100);

        let confirmed = score_artist_candidate("Sam Jones", "Sam Jones", Some(1924), Some(1924));
        assert_eq!(confirmed, 100);

        let contradicted = score_artist_candidate("Sam Jones", "Sam Jones", Some(1933), Some(1924));
        assert!(contradicted < AUTO_MATCH_THRESHOLD);
    }
}
