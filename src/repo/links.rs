//! Link tables: recording↔release and recording↔performer(↔instrument).

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{PerformerRole, RecordingPerformer, RecordingRelease};

/// Upsert the recording↔release link, unique per pair. Track position
/// fields only fill gaps so re-imports cannot erase known positions.
pub async fn link_recording_release(
    conn: &mut PgConnection,
    recording_id: Uuid,
    release_id: Uuid,
    disc_number: Option<i32>,
    track_number: Option<i32>,
    track_title: Option<&str>,
) -> Result<RecordingRelease> {
    sqlx::query_as::<_, RecordingRelease>(
        r#"
        INSERT INTO recording_releases (recording_id, release_id, disc_number, track_number, track_title)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (recording_id, release_id) DO UPDATE SET
            disc_number = COALESCE(recording_releases.disc_number, EXCLUDED.disc_number),
            track_number = COALESCE(recording_releases.track_number, EXCLUDED.track_number),
            track_title = COALESCE(recording_releases.track_title, EXCLUDED.track_title)
        RETURNING *
        "#,
    )
    .bind(recording_id)
    .bind(release_id)
    .bind(disc_number)
    .bind(track_number)
    .bind(track_title)
    .fetch_one(conn)
    .await
    .context("Failed to link recording to release")
}

pub async fn find_recording_release(
    conn: &mut PgConnection,
    recording_id: Uuid,
    release_id: Uuid,
) -> Result<Option<RecordingRelease>> {
    sqlx::query_as::<_, RecordingRelease>(
        "SELECT * FROM recording_releases WHERE recording_id = $1 AND release_id = $2",
    )
    .bind(recording_id)
    .bind(release_id)
    .fetch_optional(conn)
    .await
    .context("Failed to query recording/release link")
}

/// Is this performer already linked to the recording (under any instrument)?
pub async fn performer_linked(
    conn: &mut PgConnection,
    recording_id: Uuid,
    performer_id: Uuid,
) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM recording_performers WHERE recording_id = $1 AND performer_id = $2 LIMIT 1",
    )
    .bind(recording_id)
    .bind(performer_id)
    .fetch_optional(conn)
    .await
    .context("Failed to check performer link")?;
    Ok(row.is_some())
}

/// Insert one (recording, performer, instrument, role) row. Duplicate rows
/// are ignored by the conflict target; returns None when the row already
/// existed.
pub async fn link_recording_performer(
    conn: &mut PgConnection,
    recording_id: Uuid,
    performer_id: Uuid,
    instrument_id: Option<Uuid>,
    role: PerformerRole,
) -> Result<Option<RecordingPerformer>> {
    sqlx::query_as::<_, RecordingPerformer>(
        r#"
        INSERT INTO recording_performers (recording_id, performer_id, instrument_id, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT DO NOTHING
        RETURNING *
        "#,
    )
    .bind(recording_id)
    .bind(performer_id)
    .bind(instrument_id)
    .bind(role)
    .fetch_optional(conn)
    .await
    .context("Failed to link performer to recording")
}

pub async fn leader_count(conn: &mut PgConnection, recording_id: Uuid) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM recording_performers WHERE recording_id = $1 AND role = 'leader'",
    )
    .bind(recording_id)
    .fetch_one(conn)
    .await
    .context("Failed to count leaders")?;
    Ok(count)
}

pub async fn performer_link_count(conn: &mut PgConnection, recording_id: Uuid) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM recording_performers WHERE recording_id = $1")
            .bind(recording_id)
            .fetch_one(conn)
            .await
            .context("Failed to count performer links")?;
    Ok(count)
}

/// Promote the first non-technical row to leader. Used when an import ends
/// with performers but no leader assignment.
pub async fn promote_first_leader(conn: &mut PgConnection, recording_id: Uuid) -> Result<bool> {
    let updated = sqlx::query(
        r#"
        UPDATE recording_performers
        SET role = 'leader'
        WHERE id = (
            SELECT id FROM recording_performers
            WHERE recording_id = $1 AND role != 'other'
            ORDER BY created_at, id
            LIMIT 1
        )
        "#,
    )
    .bind(recording_id)
    .execute(conn)
    .await
    .context("Failed to promote leader")?;

    Ok(updated.rows_affected() > 0)
}
