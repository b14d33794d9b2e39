//! Tournament service
//!
//! Owns the session lifecycle. Each mutating operation loads the session,
//! runs the command through the state machine, then commits the resulting
//! transition in one transaction whose first statement is the version
//! compare-and-swap. Events are emitted only after the commit.

use crate::bracket::{bracket_size, validate_requested_size, Bracket};
use crate::catalog::{enqueue_stat_events, ImageCatalog};
use crate::db::{choices, results, sessions};
use crate::finalizer::{compute_result, FinalizeOptions};
use crate::models::{
    Choice, ChoiceSubmission, Effect, MatchupView, ResultPage, SessionCommand, SessionPhase,
    StyleProfile, TournamentResult, TournamentSession, Transition,
};
use crate::settings::TournamentSettings;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;
use stylepick_common::db::retry_on_lock;
use stylepick_common::time::{millis_between, now};
use stylepick_common::{Error, EventBus, Result, SessionStatus, StyleEvent};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Largest history page
pub const MAX_HISTORY_PAGE: u32 = 100;

/// Single-elimination tournament service
pub struct TournamentService<C> {
    inner: Arc<ServiceInner<C>>,
}

struct ServiceInner<C> {
    pool: SqlitePool,
    catalog: C,
    settings: TournamentSettings,
    events: EventBus,
}

impl<C> Clone for TournamentService<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A transition that made it to disk
struct Committed {
    session: TournamentSession,
    result: Option<TournamentResult>,
}

impl<C: ImageCatalog> TournamentService<C> {
    pub fn new(pool: SqlitePool, catalog: C, settings: TournamentSettings, events: EventBus) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                pool,
                catalog,
                settings,
                events,
            }),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    pub fn catalog(&self) -> &C {
        &self.inner.catalog
    }

    pub fn settings(&self) -> &TournamentSettings {
        &self.inner.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Start a tournament for `user_id` over `category`
    ///
    /// The bracket holds the largest power of two not exceeding either the
    /// request or the number of active images, and its first matchup is
    /// set before the session is returned.
    pub async fn start(
        &self,
        user_id: &str,
        category: &str,
        requested_size: usize,
    ) -> Result<TournamentSession> {
        validate_requested_size(requested_size)?;
        if user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user_id must not be empty".to_string()));
        }
        if category.trim().is_empty() {
            return Err(Error::InvalidInput("category must not be empty".to_string()));
        }

        if let Some(open) = sessions::find_open_session(&self.inner.pool, user_id, category).await? {
            return Err(Error::Conflict(format!(
                "User '{}' already has an open tournament {} in '{}'",
                user_id, open.id, category
            )));
        }

        let candidates = self
            .inner
            .catalog
            .fetch_candidates(category, requested_size)
            .await?;
        let size = bracket_size(candidates.len(), requested_size)?;

        let mut ids: Vec<Uuid> = candidates.iter().take(size).map(|c| c.id).collect();
        if self.inner.settings.shuffle_candidates {
            ids.shuffle(&mut rand::thread_rng());
        }

        let transition =
            SessionPhase::Active(Bracket::new(ids)?).apply(SessionCommand::EnsureMatchup)?;
        let started_at = now();
        let session = TournamentSession {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            category: category.to_string(),
            tournament_size: size as u32,
            phase: transition.phase,
            matchup_started_at: Some(started_at),
            version: 0,
            started_at,
            last_activity_at: started_at,
            completed_at: None,
        };

        retry_on_lock("start_tournament", self.inner.settings.retry, || {
            sessions::insert_session(&self.inner.pool, &session)
        })
        .await?;

        info!(
            session_id = %session.id,
            user_id = %session.user_id,
            category = %session.category,
            tournament_size = size,
            total_rounds = session.bracket().total_rounds(),
            "Tournament started"
        );

        self.inner.events.emit_lossy(StyleEvent::TournamentStarted {
            session_id: session.id,
            user_id: session.user_id.clone(),
            category: session.category.clone(),
            tournament_size: session.tournament_size,
            timestamp: started_at,
        });

        Ok(session)
    }

    /// The user's open session in `category` (active or paused)
    pub async fn get_active_session(
        &self,
        user_id: &str,
        category: &str,
    ) -> Result<Option<TournamentSession>> {
        sessions::find_open_session(&self.inner.pool, user_id, category).await
    }

    /// Load a session, failing with `NotFound` for unknown ids
    pub async fn get_session(&self, session_id: Uuid) -> Result<TournamentSession> {
        sessions::load_session(&self.inner.pool, session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Tournament session {}", session_id)))
    }

    /// The pair awaiting a decision, generating it if needed
    pub async fn get_current_matchup(&self, session_id: Uuid) -> Result<MatchupView> {
        let mut session = self.get_session(session_id).await?;

        match session.status() {
            SessionStatus::Active => {}
            SessionStatus::Completed => return finished_view(&session),
            status => {
                return Err(Error::InvalidState(format!(
                    "Session {} is {}",
                    session_id, status
                )))
            }
        }

        if session.current_matchup().is_none() {
            let transition = session.phase.clone().apply(SessionCommand::EnsureMatchup)?;
            if !transition.is_noop() {
                session = self.commit(session, transition, None, "ensure_matchup").await?.session;
            }
        }
        if session.status() == SessionStatus::Completed {
            return finished_view(&session);
        }

        let matchup = session.current_matchup().ok_or_else(|| {
            Error::Internal(format!("Active session {} has no matchup", session_id))
        })?;
        let mut images = self
            .inner
            .catalog
            .get_images(&[matchup.option_a, matchup.option_b])
            .await?;
        if images.len() != 2 || images[0].id != matchup.option_a || images[1].id != matchup.option_b
        {
            return Err(Error::NotFound(format!(
                "Matchup images for session {} are no longer in the catalog",
                session_id
            )));
        }
        let option_b = images.remove(1);
        let option_a = images.remove(0);

        let bracket = session.bracket();
        Ok(MatchupView::Pending {
            session_id,
            option_a,
            option_b,
            current_round: bracket.current_round(),
            total_rounds: bracket.total_rounds(),
            progress_percentage: bracket.progress_percentage(),
            remaining: bracket.remaining().len(),
        })
    }

    /// Record a decision on the current matchup
    ///
    /// When the choice leaves a single candidate the session is completed
    /// and its result written in the same transaction. A submission whose
    /// matchup is no longer current, including a repeat of one that already
    /// succeeded, fails with `Conflict`.
    pub async fn submit_choice(
        &self,
        session_id: Uuid,
        submission: ChoiceSubmission,
    ) -> Result<TournamentSession> {
        submission.validate()?;
        let session = self.get_session(session_id).await?;
        if session.status() != SessionStatus::Active {
            return Err(Error::InvalidState(format!(
                "Session {} is {}",
                session_id,
                session.status()
            )));
        }

        // The submission must answer the pair currently on screen
        if session.current_matchup() != Some(submission.matchup) {
            warn!(
                session_id = %session_id,
                winner_id = %submission.winner_id,
                "Rejected choice for a matchup that is no longer current"
            );
            return Err(Error::Conflict(format!(
                "Matchup {} vs {} was already answered (stale matchup)",
                submission.matchup.option_a, submission.matchup.option_b
            )));
        }

        let transition = session.phase.clone().apply(SessionCommand::Choose {
            winner: submission.winner_id,
        })?;

        match self.commit(session, transition, Some(submission), "submit_choice").await {
            Ok(committed) => Ok(committed.session),
            Err(Error::Conflict(reason)) => {
                warn!(
                    session_id = %session_id,
                    winner_id = %submission.winner_id,
                    reason = %reason,
                    "Rejected stale choice"
                );
                Err(Error::Conflict(reason))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn pause(&self, session_id: Uuid) -> Result<TournamentSession> {
        self.change_status(session_id, SessionCommand::Pause, "pause_tournament")
            .await
    }

    pub async fn resume(&self, session_id: Uuid) -> Result<TournamentSession> {
        self.change_status(session_id, SessionCommand::Resume, "resume_tournament")
            .await
    }

    pub async fn abandon(&self, session_id: Uuid) -> Result<TournamentSession> {
        self.change_status(session_id, SessionCommand::Abandon, "abandon_tournament")
            .await
    }

    /// Complete a collapsed session and return its result
    ///
    /// Safe to call repeatedly: a completed session returns the stored
    /// result, writing it first if an earlier attempt never did.
    pub async fn finalize(&self, session_id: Uuid) -> Result<TournamentResult> {
        let session = self.get_session(session_id).await?;

        if session.status() == SessionStatus::Completed {
            return self.completed_result(&session).await;
        }

        let transition = session.phase.clone().apply(SessionCommand::Finalize)?;
        match self.commit(session, transition, None, "finalize_tournament").await {
            Ok(Committed {
                result: Some(result),
                ..
            }) => Ok(result),
            Ok(Committed { session, .. }) => Err(Error::Internal(format!(
                "Finalizing session {} produced no result",
                session.id
            ))),
            Err(Error::Conflict(reason)) => {
                // Another writer may have completed it first
                let session = self.get_session(session_id).await?;
                if session.status() == SessionStatus::Completed {
                    self.completed_result(&session).await
                } else {
                    Err(Error::Conflict(reason))
                }
            }
            Err(e) => Err(e),
        }
    }

    /// The session's result, or `None` until it completes
    pub async fn get_result(&self, session_id: Uuid) -> Result<Option<TournamentResult>> {
        let session = self.get_session(session_id).await?;
        if session.status() != SessionStatus::Completed {
            return Ok(None);
        }
        self.completed_result(&session).await.map(Some)
    }

    /// The session's decisions in ledger order
    pub async fn list_choices(&self, session_id: Uuid) -> Result<Vec<Choice>> {
        self.get_session(session_id).await?;
        choices::list_choices(&self.inner.pool, session_id).await
    }

    /// A page of the user's completed tournaments, newest first
    pub async fn history(
        &self,
        user_id: &str,
        category: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<ResultPage> {
        let limit = limit.clamp(1, MAX_HISTORY_PAGE);
        let total = results::count_results(&self.inner.pool, user_id, category).await?;
        let page = results::list_results(&self.inner.pool, user_id, category, limit, offset).await?;
        let has_more = i64::from(offset) + (page.len() as i64) < total;

        Ok(ResultPage {
            results: page,
            total,
            limit,
            offset,
            has_more,
        })
    }

    /// Latest style profile per category for the user
    pub async fn user_style_profile(&self, user_id: &str) -> Result<BTreeMap<String, StyleProfile>> {
        let latest = results::latest_results_per_category(&self.inner.pool, user_id).await?;

        let mut profiles = BTreeMap::new();
        for result in latest {
            profiles
                .entry(result.category.clone())
                .or_insert(result.style_profile);
        }
        Ok(profiles)
    }

    async fn change_status(
        &self,
        session_id: Uuid,
        command: SessionCommand,
        operation: &'static str,
    ) -> Result<TournamentSession> {
        let session = self.get_session(session_id).await?;
        let transition = session.phase.clone().apply(command)?;
        let committed = self.commit(session, transition, None, operation).await?;
        Ok(committed.session)
    }

    /// Stored result of a completed session, repairing a missing one
    async fn completed_result(&self, session: &TournamentSession) -> Result<TournamentResult> {
        if let Some(result) = results::load_result_by_session(&self.inner.pool, session.id).await? {
            return Ok(result);
        }

        warn!(session_id = %session.id, "Completed session has no result, writing it now");
        let completed_at = session.completed_at.unwrap_or_else(now);
        retry_on_lock("write_missing_result", self.inner.settings.retry, || {
            self.write_result_tx(session, completed_at)
        })
        .await
    }

    /// Persist a transition computed from `before`
    async fn commit(
        &self,
        before: TournamentSession,
        transition: Transition,
        submission: Option<ChoiceSubmission>,
        operation: &'static str,
    ) -> Result<Committed> {
        let timestamp = now();
        let expected_version = before.version;
        let mut after = TournamentSession {
            phase: transition.phase,
            last_activity_at: timestamp,
            ..before.clone()
        };

        let mut choice = None;
        let mut champion = None;
        let mut events = Vec::new();

        for effect in &transition.effects {
            match effect {
                Effect::ChoiceMade(reduction) => {
                    let submission = submission.ok_or_else(|| {
                        Error::Internal("Choice effect without a submission".to_string())
                    })?;
                    let observed = before
                        .matchup_started_at
                        .map(|shown| millis_between(&shown, &timestamp));
                    let recorded = Choice::from_reduction(
                        before.id,
                        after.bracket().eliminated().len() as u32,
                        reduction,
                        &submission,
                        self.inner.settings.speed_bonus_threshold_ms,
                        observed,
                        timestamp,
                    );
                    events.push(StyleEvent::ChoiceRecorded {
                        session_id: before.id,
                        round_number: recorded.round_number,
                        winner_id: recorded.winner_id,
                        loser_id: recorded.loser_id,
                        response_time_ms: recorded.response_time_ms,
                        is_speed_bonus: recorded.is_speed_bonus,
                        remaining: reduction.remaining,
                        timestamp,
                    });
                    after.matchup_started_at = None;
                    choice = Some(recorded);
                }
                Effect::MatchupStarted(_) => {
                    after.matchup_started_at = Some(timestamp);
                }
                Effect::StatusChanged { from, to } => {
                    // Latency restarts when a paused matchup is shown again
                    if *to == SessionStatus::Active && after.current_matchup().is_some() {
                        after.matchup_started_at = Some(timestamp);
                    }
                    events.push(StyleEvent::SessionStatusChanged {
                        session_id: before.id,
                        old_status: *from,
                        new_status: *to,
                        timestamp,
                    });
                }
                Effect::Finalize { champion: id } => {
                    after.completed_at = Some(timestamp);
                    after.matchup_started_at = None;
                    champion = Some(*id);
                }
            }
        }

        let result = retry_on_lock(operation, self.inner.settings.retry, || {
            self.write_transition(&after, expected_version, choice.as_ref(), champion.is_some())
        })
        .await?;
        after.version = expected_version + 1;

        if let Some(recorded) = &choice {
            debug!(
                session_id = %after.id,
                round = recorded.round_number,
                winner_id = %recorded.winner_id,
                loser_id = %recorded.loser_id,
                remaining = after.bracket().remaining().len(),
                "Choice recorded"
            );
        }
        if before.status() != after.status() {
            info!(
                session_id = %after.id,
                user_id = %after.user_id,
                category = %after.category,
                old_status = %before.status(),
                new_status = %after.status(),
                "Tournament status changed"
            );
        }
        if let Some(champion_id) = champion {
            info!(
                session_id = %after.id,
                champion_id = %champion_id,
                choices = after.bracket().eliminated().len(),
                "Tournament completed"
            );
            events.push(StyleEvent::TournamentCompleted {
                session_id: after.id,
                user_id: after.user_id.clone(),
                category: after.category.clone(),
                champion_id,
                timestamp,
            });
        }

        for event in events {
            self.inner.events.emit_lossy(event);
        }

        Ok(Committed {
            session: after,
            result,
        })
    }

    /// One attempt at writing a transition
    async fn write_transition(
        &self,
        session: &TournamentSession,
        expected_version: i64,
        choice: Option<&Choice>,
        finalize: bool,
    ) -> Result<Option<TournamentResult>> {
        let mut tx = self.inner.pool.begin().await?;

        if !sessions::update_session(&mut *tx, session, expected_version).await? {
            return Err(Error::Conflict(format!(
                "Session {} changed since version {} (stale matchup)",
                session.id, expected_version
            )));
        }

        if let Some(choice) = choice {
            choices::insert_choice(&mut *tx, choice).await?;
            enqueue_stat_events(&mut *tx, choice.option_a_id, choice.option_b_id, choice.winner_id)
                .await?;
        }

        let result = if finalize {
            let completed_at = session.completed_at.unwrap_or(session.last_activity_at);
            Some(self.write_result(&mut *tx, session, completed_at).await?)
        } else {
            None
        };

        tx.commit().await?;
        Ok(result)
    }

    async fn write_result_tx(
        &self,
        session: &TournamentSession,
        completed_at: DateTime<Utc>,
    ) -> Result<TournamentResult> {
        let mut tx = self.inner.pool.begin().await?;
        let result = self.write_result(&mut *tx, session, completed_at).await?;
        tx.commit().await?;
        Ok(result)
    }

    /// Compute and insert the result, or return the one already stored
    async fn write_result(
        &self,
        conn: &mut SqliteConnection,
        session: &TournamentSession,
        completed_at: DateTime<Utc>,
    ) -> Result<TournamentResult> {
        let recorded = choices::count_choices(&mut *conn, session.id).await?;
        let eliminated = session.bracket().eliminated().len();
        if recorded != eliminated as i64 {
            return Err(Error::Internal(format!(
                "Session {} has {} recorded choices for {} eliminations",
                session.id, recorded, eliminated
            )));
        }
        let ledger = choices::list_choices(&mut *conn, session.id).await?;
        let prior = choices::list_prior_choices(
            &mut *conn,
            &session.user_id,
            &session.category,
            session.id,
        )
        .await?;

        let result = compute_result(
            session,
            &ledger,
            &prior,
            FinalizeOptions {
                dominant_top_k: self.inner.settings.dominant_top_k,
                completed_at,
            },
        )?;

        if results::insert_result(&mut *conn, &result).await? {
            return Ok(result);
        }
        results::load_result_by_session(&mut *conn, session.id)
            .await?
            .ok_or_else(|| {
                Error::Internal(format!("Result for session {} vanished", session.id))
            })
    }
}

fn finished_view(session: &TournamentSession) -> Result<MatchupView> {
    let champion_id = session.bracket().champion().ok_or_else(|| {
        Error::Internal(format!("Completed session {} has no champion", session.id))
    })?;
    Ok(MatchupView::Finished {
        session_id: session.id,
        champion_id,
    })
}
