//! Choice ledger persistence
//!
//! Append-only: rows are inserted inside the choice transaction and never
//! updated or deleted afterwards.

use crate::db::parse_uuid;
use crate::models::{Choice, ConfidenceLevel};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};
use stylepick_common::time::{from_db, to_db};
use stylepick_common::{Error, Result};
use uuid::Uuid;

const CHOICE_COLUMNS: &str = "c.guid, c.session_id, c.sequence, c.round_number, c.option_a_id, \
     c.option_b_id, c.winner_id, c.loser_id, c.response_time_ms, c.observed_latency_ms, \
     c.confidence_level, c.is_speed_bonus, c.chosen_at";

/// Append one choice
pub async fn insert_choice<'e, E>(executor: E, choice: &Choice) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO tournament_choices (
            guid, session_id, sequence, round_number, option_a_id, option_b_id,
            winner_id, loser_id, response_time_ms, observed_latency_ms,
            confidence_level, is_speed_bonus, chosen_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(choice.id.to_string())
    .bind(choice.session_id.to_string())
    .bind(choice.sequence as i64)
    .bind(choice.round_number as i64)
    .bind(choice.option_a_id.to_string())
    .bind(choice.option_b_id.to_string())
    .bind(choice.winner_id.to_string())
    .bind(choice.loser_id.to_string())
    .bind(to_db_millis("response_time_ms", choice.response_time_ms)?)
    .bind(
        choice
            .observed_latency_ms
            .map(|ms| to_db_millis("observed_latency_ms", ms))
            .transpose()?,
    )
    .bind(choice.confidence_level.map(|c| c.get() as i64))
    .bind(choice.is_speed_bonus)
    .bind(to_db(&choice.chosen_at))
    .execute(executor)
    .await?;

    Ok(())
}

fn to_db_millis(column: &str, ms: u64) -> Result<i64> {
    i64::try_from(ms)
        .map_err(|_| Error::InvalidInput(format!("{} value {} is out of range", column, ms)))
}

/// A session's choices in ledger order
pub async fn list_choices<'e, E>(executor: E, session_id: Uuid) -> Result<Vec<Choice>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM tournament_choices c WHERE c.session_id = ? ORDER BY c.sequence",
        CHOICE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(session_id.to_string())
        .fetch_all(executor)
        .await?;

    rows.iter().map(choice_from_row).collect()
}

/// Number of choices recorded for a session
pub async fn count_choices<'e, E>(executor: E, session_id: Uuid) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM tournament_choices WHERE session_id = ?")
            .bind(session_id.to_string())
            .fetch_one(executor)
            .await?;
    Ok(count)
}

/// The user's choices from other completed sessions in `category`, oldest first
pub async fn list_prior_choices<'e, E>(
    executor: E,
    user_id: &str,
    category: &str,
    exclude_session: Uuid,
) -> Result<Vec<Choice>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"
        SELECT {}
        FROM tournament_choices c
        JOIN tournament_sessions s ON s.guid = c.session_id
        WHERE s.user_id = ? AND s.category = ? AND s.status = 'completed' AND s.guid != ?
        ORDER BY c.chosen_at, c.sequence
        "#,
        CHOICE_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(category)
        .bind(exclude_session.to_string())
        .fetch_all(executor)
        .await?;

    rows.iter().map(choice_from_row).collect()
}

fn choice_from_row(row: &SqliteRow) -> Result<Choice> {
    let id: String = row.try_get("guid")?;
    let session_id: String = row.try_get("session_id")?;
    let option_a: String = row.try_get("option_a_id")?;
    let option_b: String = row.try_get("option_b_id")?;
    let winner: String = row.try_get("winner_id")?;
    let loser: String = row.try_get("loser_id")?;
    let chosen_at: String = row.try_get("chosen_at")?;
    let confidence: Option<i64> = row.try_get("confidence_level")?;
    let observed: Option<i64> = row.try_get("observed_latency_ms")?;

    Ok(Choice {
        id: parse_uuid("tournament_choices.guid", &id)?,
        session_id: parse_uuid("tournament_choices.session_id", &session_id)?,
        sequence: row.try_get::<i64, _>("sequence")? as u32,
        round_number: row.try_get::<i64, _>("round_number")? as u32,
        option_a_id: parse_uuid("tournament_choices.option_a_id", &option_a)?,
        option_b_id: parse_uuid("tournament_choices.option_b_id", &option_b)?,
        winner_id: parse_uuid("tournament_choices.winner_id", &winner)?,
        loser_id: parse_uuid("tournament_choices.loser_id", &loser)?,
        response_time_ms: row.try_get::<i64, _>("response_time_ms")?.max(0) as u64,
        observed_latency_ms: observed.map(|ms| ms.max(0) as u64),
        confidence_level: confidence
            .map(|c| ConfidenceLevel::new(c.clamp(0, i64::from(u8::MAX)) as u8))
            .transpose()?,
        is_speed_bonus: row.try_get("is_speed_bonus")?,
        chosen_at: from_db(&chosen_at)?,
    })
}
