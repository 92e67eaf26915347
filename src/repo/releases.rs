//! Release upserts and the cover-art polling marker.

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::Release;

/// Upsert a release by its external release id, filling gaps on re-import.
pub async fn upsert_release(
    conn: &mut PgConnection,
    musicbrainz_release_id: &str,
    title: &str,
    artist_credit: Option<&str>,
    release_year: Option<i32>,
) -> Result<Release> {
    sqlx::query_as::<_, Release>(
        r#"
        INSERT INTO releases (musicbrainz_release_id, title, artist_credit, release_year)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (musicbrainz_release_id) DO UPDATE SET
            artist_credit = COALESCE(releases.artist_credit, EXCLUDED.artist_credit),
            release_year = COALESCE(releases.release_year, EXCLUDED.release_year),
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(musicbrainz_release_id)
    .bind(title)
    .bind(artist_credit)
    .bind(release_year)
    .fetch_one(conn)
    .await
    .context("Failed to upsert release")
}

pub async fn find_release_by_id(
    conn: &mut PgConnection,
    release_id: Uuid,
) -> Result<Option<Release>> {
    sqlx::query_as::<_, Release>("SELECT * FROM releases WHERE id = $1")
        .bind(release_id)
        .fetch_optional(conn)
        .await
        .context("Failed to query release by id")
}

/// Stamp a release as polled for cover art, art or no art.
pub async fn mark_release_checked(conn: &mut PgConnection, release_id: Uuid) -> Result<Release> {
    sqlx::query_as::<_, Release>(
        r#"
        UPDATE releases
        SET cover_art_checked_at = NOW(), updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(release_id)
    .fetch_one(conn)
    .await
    .context("Failed to mark release checked")
}

/// Releases of a song's recordings that have never been polled for art.
pub async fn unchecked_releases_for_song(
    conn: &mut PgConnection,
    song_id: Uuid,
    limit: i64,
) -> Result<Vec<Release>> {
    sqlx::query_as::<_, Release>(
        r#"
        SELECT DISTINCT rel.*
        FROM releases rel
        JOIN recording_releases rr ON rr.release_id = rel.id
        JOIN recordings rec ON rec.id = rr.recording_id
        WHERE rec.song_id = $1
          AND rel.musicbrainz_release_id IS NOT NULL
          AND rel.cover_art_checked_at IS NULL
        LIMIT $2
        "#,
    )
    .bind(song_id)
    .bind(limit)
    .fetch_all(conn)
    .await
    .context("Failed to list unchecked releases for song")
}

/// All never-polled releases, for the backfill pass.
pub async fn unchecked_releases(conn: &mut PgConnection, limit: i64) -> Result<Vec<Release>> {
    sqlx::query_as::<_, Release>(
        r#"
        SELECT * FROM releases
        WHERE musicbrainz_release_id IS NOT NULL
          AND cover_art_checked_at IS NULL
        ORDER BY created_at
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(conn)
    .await
    .context("Failed to list unchecked releases")
}

/// Releases a single recording appears on.
pub async fn releases_for_recording(
    conn: &mut PgConnection,
    recording_id: Uuid,
) -> Result<Vec<Release>> {
    sqlx::query_as::<_, Release>(
        r#"
        SELECT rel.*
        FROM releases rel
        JOIN recording_releases rr ON rr.release_id = rel.id
        WHERE rr.recording_id = $1
        ORDER BY rel.created_at
        "#,
    )
    .bind(recording_id)
    .fetch_all(conn)
    .await
    .context("Failed to list releases for recording")
}

/// All releases reachable from a song, for the streaming-link pass.
pub async fn releases_for_song(conn: &mut PgConnection, song_id: Uuid) -> Result<Vec<Release>> {
    sqlx::query_as::<_, Release>(
        r#"
        SELECT DISTINCT rel.*
        FROM releases rel
        JOIN recording_releases rr ON rr.release_id = rel.id
        JOIN recordings rec ON rec.id = rr.recording_id
        WHERE rec.song_id = $1
        ORDER BY rel.title
        "#,
    )
    .bind(song_id)
    .fetch_all(conn)
    .await
    .context("Failed to list releases for song")
}
