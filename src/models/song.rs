use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A composition (the abstract work). One song has many recordings.
///
/// At most one primary and one secondary encyclopedia work id; title is
/// never empty. `external_references` is a freeform name -> url map used for
/// editorial links (e.g. the jazz-standards page for the tune).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Song {
    pub id: Uuid,
    pub title: String,
    pub composer: Option<String>,
    pub musicbrainz_work_id: Option<String>,
    pub secondary_work_id: Option<String>,
    pub structure: Option<String>,
    pub external_references: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Song {
    /// Look up one named external reference (e.g. "jazzstandards").
    pub fn external_reference(&self, name: &str) -> Option<&str> {
        self.external_references
            .as_ref()
            .and_then(|refs| refs.get(name))
            .and_then(|v| v.as_str())
    }
}

/// Fields accepted by the song upsert. Absent fields leave existing values
/// untouched so repeated imports only fill gaps.
#[derive(Debug, Clone, Default)]
pub struct SongPatch {
    pub composer: Option<String>,
    pub musicbrainz_work_id: Option<String>,
    pub secondary_work_id: Option<String>,
    pub structure: Option<String>,
    pub external_references: Option<serde_json::Value>,
}
