//! Instrument upserts, unique by name case-insensitively.

use anyhow::{Context, Result};
use sqlx::PgConnection;

use crate::models::Instrument;

pub async fn get_or_create_instrument(
    conn: &mut PgConnection,
    name: &str,
) -> Result<Instrument> {
    let name = name.trim();

    if let Some(existing) =
        sqlx::query_as::<_, Instrument>("SELECT * FROM instruments WHERE LOWER(name) = LOWER($1)")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to query instrument")?
    {
        return Ok(existing);
    }

    // A concurrent writer may land the same name between the select and the
    // insert; on conflict, re-read the winner.
    let inserted = sqlx::query_as::<_, Instrument>(
        r#"
        INSERT INTO instruments (name)
        VALUES ($1)
        ON CONFLICT DO NOTHING
        RETURNING *
        "#,
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to insert instrument")?;

    match inserted {
        Some(instrument) => Ok(instrument),
        None => sqlx::query_as::<_, Instrument>(
            "SELECT * FROM instruments WHERE LOWER(name) = LOWER($1)",
        )
        .bind(name)
        .fetch_one(conn)
        .await
        .context("Failed to re-read instrument after conflict"),
    }
}
