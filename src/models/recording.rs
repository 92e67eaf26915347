use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single captured performance of a song; may appear on many releases.
///
/// `default_release_id`, when set, must be a member of the recording's
/// release link set. `album_title` is denormalized for display.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recording {
    pub id: Uuid,
    pub song_id: Uuid,
    pub album_title: Option<String>,
    pub recording_year: Option<i32>,
    pub recording_date: Option<NaiveDate>,
    pub musicbrainz_id: Option<String>,
    pub is_canonical: bool,
    pub default_release_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
