use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a performer on one recording. Exactly the billed artist(s) carry
/// `leader`; technical credits (engineer, producer, mix, mastering) are
/// `other`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "performer_role", rename_all = "lowercase")]
pub enum PerformerRole {
    Leader,
    Sideman,
    Other,
}

impl PerformerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformerRole::Leader => "leader",
            PerformerRole::Sideman => "sideman",
            PerformerRole::Other => "other",
        }
    }
}

impl std::fmt::Display for PerformerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Link row: a performer (optionally on one instrument) on a recording.
/// Unique per (recording, performer, instrument).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecordingPerformer {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub performer_id: Uuid,
    pub instrument_id: Option<Uuid>,
    pub role: PerformerRole,
    pub created_at: DateTime<Utc>,
}

/// Link row: a recording's appearance on a release, with track position.
/// Unique per (recording, release).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecordingRelease {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub release_id: Uuid,
    pub disc_number: Option<i32>,
    pub track_number: Option<i32>,
    pub track_title: Option<String>,
    pub created_at: DateTime<Utc>,
}
