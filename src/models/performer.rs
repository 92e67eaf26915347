use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// MusicBrainz artist type for a performer row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "artist_type", rename_all = "lowercase")]
pub enum ArtistType {
    Person,
    Group,
    Other,
}

impl ArtistType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtistType::Person => "person",
            ArtistType::Group => "group",
            ArtistType::Other => "other",
        }
    }

    /// Map MusicBrainz's free-text `type` field onto the closed set.
    pub fn from_musicbrainz(value: Option<&str>) -> Self {
        match value {
            Some("Person") => ArtistType::Person,
            Some("Group") | Some("Orchestra") | Some("Choir") => ArtistType::Group,
            _ => ArtistType::Other,
        }
    }
}

impl std::fmt::Display for ArtistType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A musician (or group) appearing on recordings.
///
/// `musicbrainz_artist_id` is unique when present.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Performer {
    pub id: Uuid,
    pub name: String,
    pub sort_name: Option<String>,
    pub biography: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub death_date: Option<NaiveDate>,
    pub musicbrainz_artist_id: Option<String>,
    pub disambiguation: Option<String>,
    pub artist_type: ArtistType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Performer {
    pub fn birth_year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.birth_date.map(|d| d.year())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artist_type_from_musicbrainz() {
        assert_eq!(ArtistType::from_musicbrainz(Some("Person")), ArtistType::Person);
        assert_eq!(ArtistType::from_musicbrainz(Some("Group")), ArtistType::Group);
        assert_eq!(ArtistType::from_musicbrainz(Some("Character")), ArtistType::Other);
        assert_eq!(ArtistType::from_musicbrainz(None), ArtistType::Other);
    }
}
