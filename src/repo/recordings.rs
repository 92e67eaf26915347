//! Recording upserts and the default-release pointer.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::Recording;

/// Upsert a recording. Keyed by the external recording id when present;
/// editorial stubs without one fall back to (song, album title).
pub async fn upsert_recording(
    conn: &mut PgConnection,
    song_id: Uuid,
    musicbrainz_id: Option<&str>,
    album_title: Option<&str>,
    recording_year: Option<i32>,
    recording_date: Option<NaiveDate>,
) -> Result<Recording> {
    if let Some(mbid) = musicbrainz_id {
        return sqlx::query_as::<_, Recording>(
            r#"
            INSERT INTO recordings (song_id, musicbrainz_id, album_title, recording_year, recording_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (musicbrainz_id) DO UPDATE SET
                album_title = COALESCE(recordings.album_title, EXCLUDED.album_title),
                recording_year = COALESCE(recordings.recording_year, EXCLUDED.recording_year),
                recording_date = COALESCE(recordings.recording_date, EXCLUDED.recording_date),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(song_id)
        .bind(mbid)
        .bind(album_title)
        .bind(recording_year)
        .bind(recording_date)
        .fetch_one(conn)
        .await
        .context("Failed to upsert recording by external id");
    }

    let Some(album_title) = album_title else {
        bail!("recording upsert needs an external id or an album title");
    };

    let existing = sqlx::query_as::<_, Recording>(
        "SELECT * FROM recordings WHERE song_id = $1 AND LOWER(album_title) = LOWER($2)",
    )
    .bind(song_id)
    .bind(album_title)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to query recording by album title")?;

    if let Some(existing) = existing {
        return sqlx::query_as::<_, Recording>(
            r#"
            UPDATE recordings
            SET recording_year = COALESCE(recording_year, $2),
                recording_date = COALESCE(recording_date, $3),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(existing.id)
        .bind(recording_year)
        .bind(recording_date)
        .fetch_one(conn)
        .await
        .context("Failed to update stub recording");
    }

    sqlx::query_as::<_, Recording>(
        r#"
        INSERT INTO recordings (song_id, album_title, recording_year, recording_date)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(song_id)
    .bind(album_title)
    .bind(recording_year)
    .bind(recording_date)
    .fetch_one(conn)
    .await
    .context("Failed to insert stub recording")
}

pub async fn find_by_musicbrainz_id(
    conn: &mut PgConnection,
    musicbrainz_id: &str,
) -> Result<Option<Recording>> {
    sqlx::query_as::<_, Recording>("SELECT * FROM recordings WHERE musicbrainz_id = $1")
        .bind(musicbrainz_id)
        .fetch_optional(conn)
        .await
        .context("Failed to query recording by external id")
}

pub async fn recordings_for_song(
    conn: &mut PgConnection,
    song_id: Uuid,
) -> Result<Vec<Recording>> {
    sqlx::query_as::<_, Recording>(
        "SELECT * FROM recordings WHERE song_id = $1 ORDER BY recording_year NULLS LAST, created_at",
    )
    .bind(song_id)
    .fetch_all(conn)
    .await
    .context("Failed to list recordings for song")
}

/// Point a recording at its default release. The pointer must land inside
/// the recording's release link set; a dangling target is refused.
pub async fn set_default_release(
    conn: &mut PgConnection,
    recording_id: Uuid,
    release_id: Uuid,
) -> Result<Recording> {
    let linked: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM recording_releases WHERE recording_id = $1 AND release_id = $2",
    )
    .bind(recording_id)
    .bind(release_id)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to check recording/release link")?;

    if linked.is_none() {
        bail!(
            "release {} is not linked to recording {}; refusing to set default",
            release_id,
            recording_id
        );
    }

    sqlx::query_as::<_, Recording>(
        r#"
        UPDATE recordings
        SET default_release_id = $2, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(recording_id)
    .bind(release_id)
    .fetch_one(conn)
    .await
    .context("Failed to set default release")
}
