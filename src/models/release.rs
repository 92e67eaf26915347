use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A published album edition.
///
/// `cover_art_checked_at` records that the art archive has been polled for
/// this release; it is set even when no art came back, which is how the
/// backfill pass avoids re-querying known-empty releases.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Release {
    pub id: Uuid,
    pub title: String,
    pub artist_credit: Option<String>,
    pub release_year: Option<i32>,
    pub musicbrainz_release_id: Option<String>,
    pub cover_art_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
