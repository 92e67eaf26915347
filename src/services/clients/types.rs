//! Normalized vocabulary produced by the provider adapters.
//!
//! Each client translates its provider's payload into these types; nothing
//! downstream of the client layer sees raw provider JSON.

use serde::{Deserialize, Serialize};

use crate::models::ImageType;

/// A composition as known to the encyclopedia.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRef {
    pub id: String,
    pub title: String,
}

/// A recording referenced from a work's recording relations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingRef {
    pub id: String,
    pub title: Option<String>,
}

/// One entry of a recording's (or release's) artist credit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistCreditRef {
    pub name: String,
    pub artist_id: Option<String>,
}

/// A fine-grained artist relation on a recording: relation type plus, for
/// instrument relations, the instruments carried in `attributes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRel {
    pub relation_type: String,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub artist_sort_name: Option<String>,
    pub attributes: Vec<String>,
}

/// Track position of a recording on a release medium.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackPosition {
    pub disc_number: Option<i32>,
    pub track_number: Option<i32>,
    pub track_title: Option<String>,
}

/// A release as it appears in a recording's release list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRef {
    pub id: String,
    pub title: String,
    pub date: Option<String>,
    pub artist_credit: Vec<ArtistCreditRef>,
    /// Position of the parent recording on this release, when the payload
    /// carries media information.
    pub track_position: Option<TrackPosition>,
}

impl ReleaseRef {
    pub fn release_year(&self) -> Option<i32> {
        parse_year(self.date.as_deref())
    }
}

/// Full recording detail: releases, artist credit, artist relations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingDetail {
    pub id: String,
    pub title: String,
    pub artist_credit: Vec<ArtistCreditRef>,
    pub first_release_date: Option<String>,
    pub releases: Vec<ReleaseRef>,
    pub relations: Vec<ArtistRel>,
}

impl RecordingDetail {
    pub fn recording_year(&self) -> Option<i32> {
        parse_year(self.first_release_date.as_deref())
    }
}

/// Full release detail, fetched when a recording's release list carries no
/// artist relations of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseDetail {
    pub id: String,
    pub title: String,
    pub date: Option<String>,
    pub artist_credit: Vec<ArtistCreditRef>,
    pub relations: Vec<ArtistRel>,
}

impl ReleaseDetail {
    pub fn release_year(&self) -> Option<i32> {
        parse_year(self.date.as_deref())
    }
}

/// Artist detail from the encyclopedia.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistDetail {
    pub id: String,
    pub name: String,
    pub sort_name: Option<String>,
    pub disambiguation: Option<String>,
    pub artist_type: Option<String>,
    pub begin_date: Option<String>,
    pub end_date: Option<String>,
}

/// A candidate from an artist search, with the provider's relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistCandidate {
    pub id: String,
    pub name: String,
    pub sort_name: Option<String>,
    pub disambiguation: Option<String>,
    pub artist_type: Option<String>,
    pub score: Option<i32>,
    pub begin_date: Option<String>,
}

/// One cover image from an art source, already filtered to front/back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtImage {
    pub image_type: ImageType,
    pub small_url: Option<String>,
    pub medium_url: Option<String>,
    pub large_url: Option<String>,
    pub source_id: Option<String>,
    pub source_url: Option<String>,
}

/// Result of polling an art source for a release.
#[derive(Debug, Clone)]
pub enum ArtworkLookup {
    /// Images present (front and/or back).
    Found(Vec<ArtImage>),
    /// The source answered: this release has no artwork. Still counts as a
    /// completed poll.
    NoArtwork,
    /// The source does not know the release at all.
    ReleaseUnknown,
}

/// iTunes album search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumHit {
    pub id: String,
    pub title: String,
    pub artist_name: String,
    pub year: Option<i32>,
    pub url: Option<String>,
    /// The provider's 100x100 artwork URL; larger sizes are derived from it.
    pub artwork_url_100: Option<String>,
}

/// Track search hit from a consumer service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackHit {
    pub id: String,
    pub title: String,
    pub artist_name: String,
    pub album_title: Option<String>,
    pub album_id: Option<String>,
    pub url: Option<String>,
}

/// Album detail from a consumer service, used by the streaming repair pass
/// to confirm a stored id still resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumDetail {
    pub id: String,
    pub title: String,
    pub artist_name: String,
    pub year: Option<i32>,
    pub url: Option<String>,
    pub artwork: Option<ArtworkUrls>,
}

/// Artwork URL family derived from a provider's templated artwork URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtworkUrls {
    pub small: String,
    pub medium: String,
    pub large: String,
}

/// Entry of the editorial site's top-1000 index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub title: String,
    pub url: String,
}

/// A recommended recording scraped from an editorial song page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedRecording {
    pub artist: String,
    pub album: String,
    pub year: Option<i32>,
}

/// Scrape result for one editorial song page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongPage {
    pub url: String,
    pub composer: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub recommended_recordings: Vec<RecommendedRecording>,
}

/// A licensed portrait candidate from the editorial image archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortraitInfo {
    pub url: String,
    pub caption: Option<String>,
    pub license_raw: Option<String>,
    pub attribution: Option<String>,
    pub source_page_url: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

/// Parse the leading year out of a provider date ("1959", "1959-03-02").
pub fn parse_year(date: Option<&str>) -> Option<i32> {
    let date = date?;
    let lead: String = date.chars().take_while(|c| c.is_ascii_digit()).collect();
    if lead.len() == 4 {
        lead.parse().ok()
    } else {
        None
    }
}

/// Parse a full provider date into a calendar date; partial dates yield None.
pub fn parse_full_date(date: Option<&str>) -> Option<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(date?, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_parsing_handles_partial_dates() {
        assert_eq!(parse_year(Some("1959")), Some(1959));
        assert_eq!(parse_year(Some("1959-03-02")), Some(1959));
        assert_eq!(parse_year(Some("03-02")), None);
        assert_eq!(parse_year(Some("")), None);
        assert_eq!(parse_year(None), None);
    }

    #[test]
    fn full_date_parsing_is_strict() {
        assert!(parse_full_date(Some("1959-03-02")).is_some());
        assert!(parse_full_date(Some("1959-03")).is_none());
        assert!(parse_full_date(Some("1959")).is_none());
    }
}
