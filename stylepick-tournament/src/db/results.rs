//! Tournament result persistence

use crate::db::{from_json, parse_uuid, to_json};
use crate::models::TournamentResult;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};
use stylepick_common::time::{from_db, to_db};
use stylepick_common::Result;
use uuid::Uuid;

const RESULT_COLUMNS: &str = "guid, session_id, user_id, category, champion_id, finalist_id, \
     semifinalists, elimination_order, preference_strength, consistency_score, \
     consistency_samples, decision_speed_avg_ms, dominant_preferences, total_choices, \
     speed_bonus_count, rounds_played, tournament_size, total_time_ms, style_profile, completed_at";

/// Insert a result unless the session already has one
///
/// Returns false when a result for the session was already stored.
pub async fn insert_result<'e, E>(executor: E, result: &TournamentResult) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        INSERT INTO tournament_results (
            guid, session_id, user_id, category, champion_id, finalist_id,
            semifinalists, elimination_order, preference_strength, consistency_score,
            consistency_samples, decision_speed_avg_ms, dominant_preferences, total_choices,
            speed_bonus_count, rounds_played, tournament_size, total_time_ms, style_profile,
            completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(session_id) DO NOTHING
        "#,
    )
    .bind(result.id.to_string())
    .bind(result.session_id.to_string())
    .bind(&result.user_id)
    .bind(&result.category)
    .bind(result.champion_id.to_string())
    .bind(result.finalist_id.to_string())
    .bind(to_json(&result.semifinalists)?)
    .bind(to_json(&result.elimination_order)?)
    .bind(result.preference_strength)
    .bind(result.consistency_score)
    .bind(result.consistency_samples as i64)
    .bind(result.decision_speed_avg_ms)
    .bind(to_json(&result.dominant_preferences)?)
    .bind(result.total_choices as i64)
    .bind(result.speed_bonus_count as i64)
    .bind(result.rounds_played as i64)
    .bind(result.tournament_size as i64)
    .bind(result.total_time_ms as i64)
    .bind(to_json(&result.style_profile)?)
    .bind(to_db(&result.completed_at))
    .execute(executor)
    .await?
    .rows_affected();

    Ok(rows == 1)
}

/// Result for one session
pub async fn load_result_by_session<'e, E>(
    executor: E,
    session_id: Uuid,
) -> Result<Option<TournamentResult>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM tournament_results WHERE session_id = ?",
        RESULT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(session_id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(result_from_row).transpose()
}

/// A page of the user's results, newest first
pub async fn list_results<'e, E>(
    executor: E,
    user_id: &str,
    category: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<Vec<TournamentResult>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM tournament_results \
         WHERE user_id = ? AND (? IS NULL OR category = ?) \
         ORDER BY completed_at DESC, guid \
         LIMIT ? OFFSET ?",
        RESULT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(category)
        .bind(category)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(executor)
        .await?;

    rows.iter().map(result_from_row).collect()
}

/// Number of results matching the same filter as [`list_results`]
pub async fn count_results<'e, E>(executor: E, user_id: &str, category: Option<&str>) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tournament_results WHERE user_id = ? AND (? IS NULL OR category = ?)",
    )
    .bind(user_id)
    .bind(category)
    .bind(category)
    .fetch_one(executor)
    .await?;
    Ok(count)
}

/// The most recent result per category for a user
pub async fn latest_results_per_category<'e, E>(
    executor: E,
    user_id: &str,
) -> Result<Vec<TournamentResult>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"
        SELECT {}
        FROM tournament_results r
        WHERE r.user_id = ?
          AND r.completed_at = (
              SELECT MAX(completed_at) FROM tournament_results
              WHERE user_id = r.user_id AND category = r.category
          )
        ORDER BY r.category
        "#,
        RESULT_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(executor).await?;

    rows.iter().map(result_from_row).collect()
}

fn result_from_row(row: &SqliteRow) -> Result<TournamentResult> {
    let id: String = row.try_get("guid")?;
    let session_id: String = row.try_get("session_id")?;
    let champion: String = row.try_get("champion_id")?;
    let finalist: String = row.try_get("finalist_id")?;
    let semifinalists: String = row.try_get("semifinalists")?;
    let elimination_order: String = row.try_get("elimination_order")?;
    let dominant: String = row.try_get("dominant_preferences")?;
    let style_profile: String = row.try_get("style_profile")?;
    let completed_at: String = row.try_get("completed_at")?;

    Ok(TournamentResult {
        id: parse_uuid("tournament_results.guid", &id)?,
        session_id: parse_uuid("tournament_results.session_id", &session_id)?,
        user_id: row.try_get("user_id")?,
        category: row.try_get("category")?,
        champion_id: parse_uuid("tournament_results.champion_id", &champion)?,
        finalist_id: parse_uuid("tournament_results.finalist_id", &finalist)?,
        semifinalists: from_json("semifinalists", &semifinalists)?,
        elimination_order: from_json("elimination_order", &elimination_order)?,
        preference_strength: row.try_get("preference_strength")?,
        consistency_score: row.try_get("consistency_score")?,
        consistency_samples: row.try_get::<i64, _>("consistency_samples")? as u32,
        decision_speed_avg_ms: row.try_get("decision_speed_avg_ms")?,
        dominant_preferences: from_json("dominant_preferences", &dominant)?,
        total_choices: row.try_get::<i64, _>("total_choices")? as u32,
        speed_bonus_count: row.try_get::<i64, _>("speed_bonus_count")? as u32,
        rounds_played: row.try_get::<i64, _>("rounds_played")? as u32,
        tournament_size: row.try_get::<i64, _>("tournament_size")? as u32,
        total_time_ms: row.try_get::<i64, _>("total_time_ms")?.max(0) as u64,
        style_profile: from_json("style_profile", &style_profile)?,
        completed_at: from_db(&completed_at)?,
    })
}
