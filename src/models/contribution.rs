use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Community annotation on a recording. Unique per (recording, user); the
/// row is deleted when all three payload fields are cleared.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserContribution {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub user_id: Uuid,
    pub performance_key: Option<String>,
    pub tempo_bpm: Option<i32>,
    pub is_instrumental: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserContribution {
    /// An empty contribution carries no information and should be removed.
    pub fn is_empty(&self) -> bool {
        self.performance_key.is_none() && self.tempo_bpm.is_none() && self.is_instrumental.is_none()
    }
}
