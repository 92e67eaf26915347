//! Song lookups, upsert, and the administrative delete cascade.

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::song::{Song, SongPatch};
use crate::services::resolver::{best_title_score, normalize_title, AUTO_MATCH_THRESHOLD};

pub async fn find_song_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Song>> {
    sqlx::query_as::<_, Song>("SELECT * FROM songs WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("Failed to query song by id")
}

/// Find a song by title: exact case-insensitive match, then normalized
/// equality across title variants, then the best fuzzy candidate at or above
/// the auto-match threshold.
pub async fn find_song_by_title(conn: &mut PgConnection, title: &str) -> Result<Option<Song>> {
    let exact = sqlx::query_as::<_, Song>("SELECT * FROM songs WHERE LOWER(title) = LOWER($1)")
        .bind(title)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to query song by title")?;
    if exact.is_some() {
        return Ok(exact);
    }

    // The catalog is small (a jazz-standards corpus); scan and score.
    let songs = sqlx::query_as::<_, Song>("SELECT * FROM songs ORDER BY title")
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list songs for fuzzy lookup")?;

    let wanted = normalize_title(title);
    if let Some(song) = songs.iter().find(|s| normalize_title(&s.title) == wanted) {
        return Ok(Some(song.clone()));
    }

    let mut best: Option<(&Song, u8)> = None;
    for song in &songs {
        let score = best_title_score(title, &song.title);
        if score >= AUTO_MATCH_THRESHOLD
            && best.map(|(_, existing)| score > existing).unwrap_or(true)
        {
            best = Some((song, score));
        }
    }

    if let Some((song, score)) = best {
        tracing::debug!(
            "Fuzzy-matched song '{}' to '{}' (score {})",
            title,
            song.title,
            score
        );
        return Ok(Some(song.clone()));
    }

    Ok(None)
}

/// Upsert a song by title. Existing rows are only filled where data was
/// missing; external references are merged with new keys taking precedence.
pub async fn upsert_song(
    conn: &mut PgConnection,
    title: &str,
    patch: &SongPatch,
) -> Result<Song> {
    if let Some(existing) = find_song_by_title(&mut *conn, title).await? {
        let song = sqlx::query_as::<_, Song>(
            r#"
            UPDATE songs
            SET composer = COALESCE(composer, $2),
                musicbrainz_work_id = COALESCE(musicbrainz_work_id, $3),
                secondary_work_id = COALESCE(secondary_work_id, $4),
                structure = COALESCE(structure, $5),
                external_references = COALESCE(external_references, '{}'::jsonb) || COALESCE($6, '{}'::jsonb),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(existing.id)
        .bind(&patch.composer)
        .bind(&patch.musicbrainz_work_id)
        .bind(&patch.secondary_work_id)
        .bind(&patch.structure)
        .bind(&patch.external_references)
        .fetch_one(conn)
        .await
        .context("Failed to update song")?;
        return Ok(song);
    }

    sqlx::query_as::<_, Song>(
        r#"
        INSERT INTO songs (title, composer, musicbrainz_work_id, secondary_work_id, structure, external_references)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(title)
    .bind(&patch.composer)
    .bind(&patch.musicbrainz_work_id)
    .bind(&patch.secondary_work_id)
    .bind(&patch.structure)
    .bind(&patch.external_references)
    .fetch_one(conn)
    .await
    .context("Failed to insert song")
}

/// Persist a resolved encyclopedia work id, without clobbering one a prior
/// run already stored.
pub async fn set_work_id(conn: &mut PgConnection, song_id: Uuid, work_id: &str) -> Result<Song> {
    sqlx::query_as::<_, Song>(
        r#"
        UPDATE songs
        SET musicbrainz_work_id = COALESCE(musicbrainz_work_id, $2),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(song_id)
    .bind(work_id)
    .fetch_one(conn)
    .await
    .context("Failed to persist work id")
}

/// Administrative delete. Cascade order: solo transcriptions, then
/// recording performer links, then recordings, then repertoire links, then
/// the song row itself.
pub async fn delete_song(conn: &mut PgConnection, song_id: Uuid) -> Result<u64> {
    sqlx::query(
        r#"
        DELETE FROM solo_transcriptions
        WHERE recording_id IN (SELECT id FROM recordings WHERE song_id = $1)
        "#,
    )
    .bind(song_id)
    .execute(&mut *conn)
    .await
    .context("Failed to delete solo transcriptions")?;

    sqlx::query(
        r#"
        DELETE FROM recording_performers
        WHERE recording_id IN (SELECT id FROM recordings WHERE song_id = $1)
        "#,
    )
    .bind(song_id)
    .execute(&mut *conn)
    .await
    .context("Failed to delete recording performer links")?;

    sqlx::query("DELETE FROM recordings WHERE song_id = $1")
        .bind(song_id)
        .execute(&mut *conn)
        .await
        .context("Failed to delete recordings")?;

    sqlx::query("DELETE FROM user_repertoire WHERE song_id = $1")
        .bind(song_id)
        .execute(&mut *conn)
        .await
        .context("Failed to delete repertoire links")?;

    let deleted = sqlx::query("DELETE FROM songs WHERE id = $1")
        .bind(song_id)
        .execute(conn)
        .await
        .context("Failed to delete song")?;

    Ok(deleted.rows_affected())
}
