//! Community contributions on recordings.

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::UserContribution;

/// Upsert a user's annotation, unique per (recording, user). Clearing every
/// field deletes the row; the return value is None in that case.
pub async fn upsert_contribution(
    conn: &mut PgConnection,
    recording_id: Uuid,
    user_id: Uuid,
    performance_key: Option<&str>,
    tempo_bpm: Option<i32>,
    is_instrumental: Option<bool>,
) -> Result<Option<UserContribution>> {
    if performance_key.is_none() && tempo_bpm.is_none() && is_instrumental.is_none() {
        sqlx::query(
            "DELETE FROM user_contributions WHERE recording_id = $1 AND user_id = $2",
        )
        .bind(recording_id)
        .bind(user_id)
        .execute(conn)
        .await
        .context("Failed to delete emptied contribution")?;
        return Ok(None);
    }

    let contribution = sqlx::query_as::<_, UserContribution>(
        r#"
        INSERT INTO user_contributions (
            recording_id, user_id, performance_key, tempo_bpm, is_instrumental
        )
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (recording_id, user_id) DO UPDATE SET
            performance_key = EXCLUDED.performance_key,
            tempo_bpm = EXCLUDED.tempo_bpm,
            is_instrumental = EXCLUDED.is_instrumental,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(recording_id)
    .bind(user_id)
    .bind(performance_key)
    .bind(tempo_bpm)
    .bind(is_instrumental)
    .fetch_one(conn)
    .await
    .context("Failed to upsert contribution")?;

    Ok(Some(contribution))
}
