//! Tournament session persistence
//!
//! Every mutation after creation goes through [`update_session`], a
//! compare-and-swap on the `version` column. A caller whose expected
//! version no longer matches updates zero rows and must treat its view of
//! the session as stale.

use crate::bracket::{Bracket, Matchup};
use crate::db::{from_json, parse_uuid, to_json};
use crate::models::{SessionPhase, TournamentSession};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};
use stylepick_common::time::{from_db, from_db_opt, to_db};
use stylepick_common::{Error, Result, SessionStatus};
use uuid::Uuid;

const SESSION_COLUMNS: &str = "guid, user_id, category, status, tournament_size, total_rounds, \
     current_round, remaining_queue, eliminated_history, current_matchup, matchup_started_at, \
     version, started_at, last_activity_at, completed_at";

/// Insert a freshly started session
///
/// A second open session for the same user and category violates the
/// partial unique index and is reported as `Conflict`.
pub async fn insert_session<'e, E>(executor: E, session: &TournamentSession) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let bracket = session.bracket();

    let result = sqlx::query(
        r#"
        INSERT INTO tournament_sessions (
            guid, user_id, category, status, tournament_size, total_rounds,
            current_round, remaining_queue, eliminated_history, current_matchup,
            matchup_started_at, version, started_at, last_activity_at, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session.id.to_string())
    .bind(&session.user_id)
    .bind(&session.category)
    .bind(session.status().as_str())
    .bind(session.tournament_size as i64)
    .bind(bracket.total_rounds() as i64)
    .bind(bracket.current_round() as i64)
    .bind(to_json(bracket.remaining())?)
    .bind(to_json(bracket.eliminated())?)
    .bind(bracket.current_matchup().map(|m| to_json(&m)).transpose()?)
    .bind(session.matchup_started_at.as_ref().map(to_db))
    .bind(session.version)
    .bind(to_db(&session.started_at))
    .bind(to_db(&session.last_activity_at))
    .bind(session.completed_at.as_ref().map(to_db))
    .execute(executor)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            let err = Error::from(e);
            if err.is_unique_violation() {
                Err(Error::Conflict(format!(
                    "User '{}' already has an open tournament in '{}'",
                    session.user_id, session.category
                )))
            } else {
                Err(err)
            }
        }
    }
}

/// Write `session` if the stored version still equals `expected_version`
///
/// Bumps the stored version by one. Returns false when another writer got
/// there first.
pub async fn update_session<'e, E>(
    executor: E,
    session: &TournamentSession,
    expected_version: i64,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let bracket = session.bracket();

    let rows = sqlx::query(
        r#"
        UPDATE tournament_sessions
        SET status = ?,
            current_round = ?,
            remaining_queue = ?,
            eliminated_history = ?,
            current_matchup = ?,
            matchup_started_at = ?,
            last_activity_at = ?,
            completed_at = ?,
            version = version + 1
        WHERE guid = ? AND version = ?
        "#,
    )
    .bind(session.status().as_str())
    .bind(bracket.current_round() as i64)
    .bind(to_json(bracket.remaining())?)
    .bind(to_json(bracket.eliminated())?)
    .bind(bracket.current_matchup().map(|m| to_json(&m)).transpose()?)
    .bind(session.matchup_started_at.as_ref().map(to_db))
    .bind(to_db(&session.last_activity_at))
    .bind(session.completed_at.as_ref().map(to_db))
    .bind(session.id.to_string())
    .bind(expected_version)
    .execute(executor)
    .await?
    .rows_affected();

    Ok(rows == 1)
}

/// Load a session by id
pub async fn load_session<'e, E>(executor: E, session_id: Uuid) -> Result<Option<TournamentSession>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {} FROM tournament_sessions WHERE guid = ?", SESSION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(session_id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// The user's open (active or paused) session in `category`, if any
pub async fn find_open_session<'e, E>(
    executor: E,
    user_id: &str,
    category: &str,
) -> Result<Option<TournamentSession>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM tournament_sessions \
         WHERE user_id = ? AND category = ? AND status IN ('active', 'paused') \
         ORDER BY started_at DESC LIMIT 1",
        SESSION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(category)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(session_from_row).transpose()
}

fn session_from_row(row: &SqliteRow) -> Result<TournamentSession> {
    let guid: String = row.try_get("guid")?;
    let status: String = row.try_get("status")?;
    let remaining: String = row.try_get("remaining_queue")?;
    let eliminated: String = row.try_get("eliminated_history")?;
    let matchup: Option<String> = row.try_get("current_matchup")?;
    let matchup_started_at: Option<String> = row.try_get("matchup_started_at")?;
    let started_at: String = row.try_get("started_at")?;
    let last_activity_at: String = row.try_get("last_activity_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    let remaining: Vec<Uuid> = from_json("remaining_queue", &remaining)?;
    let eliminated: Vec<Uuid> = from_json("eliminated_history", &eliminated)?;
    let matchup: Option<Matchup> = matchup
        .as_deref()
        .map(|m| from_json("current_matchup", m))
        .transpose()?;

    let bracket = Bracket::restore(
        remaining,
        eliminated,
        matchup,
        row.try_get::<i64, _>("current_round")? as u32,
        row.try_get::<i64, _>("total_rounds")? as u32,
    )?;

    Ok(TournamentSession {
        id: parse_uuid("tournament_sessions.guid", &guid)?,
        user_id: row.try_get("user_id")?,
        category: row.try_get("category")?,
        tournament_size: row.try_get::<i64, _>("tournament_size")? as u32,
        phase: SessionPhase::from_parts(SessionStatus::parse(&status)?, bracket)?,
        matchup_started_at: from_db_opt(matchup_started_at.as_deref())?,
        version: row.try_get("version")?,
        started_at: from_db(&started_at)?,
        last_activity_at: from_db(&last_activity_at)?,
        completed_at: from_db_opt(completed_at.as_deref())?,
    })
}
