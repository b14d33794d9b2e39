//! Tournament session state machine
//!
//! A session is `Active`, `Paused`, `Completed` or `Abandoned`, each phase
//! carrying its bracket. Commands are applied with [`SessionPhase::apply`],
//! which consumes the phase and returns the next one together with the side
//! effects the caller must persist. Illegal commands leave the caller's
//! session untouched because nothing is written until the transition is
//! committed.

use crate::bracket::{Bracket, Matchup, Reduction};
use crate::models::CandidateImage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use stylepick_common::{Error, Result, SessionStatus};
use uuid::Uuid;

/// Lifecycle phase with the bracket it owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Active(Bracket),
    Paused(Bracket),
    /// Bracket has collapsed to the champion
    Completed(Bracket),
    Abandoned(Bracket),
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Pause,
    Resume,
    Abandon,
    /// Make sure a matchup is set, or complete a collapsed bracket
    EnsureMatchup,
    Choose { winner: Uuid },
    Finalize,
}

/// Side effects produced by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    MatchupStarted(Matchup),
    ChoiceMade(Reduction),
    StatusChanged {
        from: SessionStatus,
        to: SessionStatus,
    },
    /// Result must be computed and written for this champion
    Finalize { champion: Uuid },
}

/// Next phase plus what happened on the way there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub phase: SessionPhase,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(phase: SessionPhase) -> Self {
        Self {
            phase,
            effects: Vec::new(),
        }
    }

    /// True when the transition leaves nothing to persist
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }
}

impl SessionPhase {
    /// Rebuild from the stored status column
    pub fn from_parts(status: SessionStatus, bracket: Bracket) -> Result<Self> {
        let phase = match status {
            SessionStatus::Active => SessionPhase::Active(bracket),
            SessionStatus::Paused => SessionPhase::Paused(bracket),
            SessionStatus::Completed => {
                if !bracket.is_collapsed() {
                    return Err(Error::Internal(format!(
                        "Completed session still has {} candidates",
                        bracket.remaining().len()
                    )));
                }
                SessionPhase::Completed(bracket)
            }
            SessionStatus::Abandoned => SessionPhase::Abandoned(bracket),
        };
        Ok(phase)
    }

    pub fn status(&self) -> SessionStatus {
        match self {
            SessionPhase::Active(_) => SessionStatus::Active,
            SessionPhase::Paused(_) => SessionStatus::Paused,
            SessionPhase::Completed(_) => SessionStatus::Completed,
            SessionPhase::Abandoned(_) => SessionStatus::Abandoned,
        }
    }

    pub fn bracket(&self) -> &Bracket {
        match self {
            SessionPhase::Active(b)
            | SessionPhase::Paused(b)
            | SessionPhase::Completed(b)
            | SessionPhase::Abandoned(b) => b,
        }
    }

    /// Apply a command, consuming the current phase
    pub fn apply(self, command: SessionCommand) -> Result<Transition> {
        use SessionCommand as C;
        use SessionPhase as P;

        match (self, command) {
            (P::Active(bracket), C::Pause) => Ok(status_change(P::Paused(bracket), SessionStatus::Active)),
            (P::Paused(bracket), C::Resume) => Ok(status_change(P::Active(bracket), SessionStatus::Paused)),
            (P::Active(bracket), C::Abandon) => {
                Ok(status_change(P::Abandoned(bracket), SessionStatus::Active))
            }

            (P::Active(mut bracket), C::EnsureMatchup) => {
                if let Some(champion) = bracket.champion() {
                    return Ok(complete(bracket, champion, Vec::new()));
                }
                match bracket.generate_matchup() {
                    Some(matchup) => Ok(Transition {
                        phase: P::Active(bracket),
                        effects: vec![Effect::MatchupStarted(matchup)],
                    }),
                    None => Ok(Transition::unchanged(P::Active(bracket))),
                }
            }

            (P::Active(mut bracket), C::Choose { winner }) => {
                let reduction = bracket.apply_choice(winner)?;
                let mut effects = vec![Effect::ChoiceMade(reduction)];
                if let Some(champion) = bracket.champion() {
                    return Ok(complete(bracket, champion, effects));
                }
                if let Some(matchup) = bracket.generate_matchup() {
                    effects.push(Effect::MatchupStarted(matchup));
                }
                Ok(Transition {
                    phase: P::Active(bracket),
                    effects,
                })
            }

            (P::Active(bracket), C::Finalize) => match bracket.champion() {
                Some(champion) => Ok(complete(bracket, champion, Vec::new())),
                None => Err(Error::InvalidState(format!(
                    "Tournament still has {} candidates remaining",
                    bracket.remaining().len()
                ))),
            },

            // Finalizing twice is a no-op
            (P::Completed(bracket), C::Finalize) => Ok(Transition::unchanged(P::Completed(bracket))),

            (phase, command) => Err(Error::InvalidState(format!(
                "Cannot apply {:?} to a {} session",
                command,
                phase.status()
            ))),
        }
    }
}

fn status_change(phase: SessionPhase, from: SessionStatus) -> Transition {
    let to = phase.status();
    Transition {
        phase,
        effects: vec![Effect::StatusChanged { from, to }],
    }
}

fn complete(bracket: Bracket, champion: Uuid, mut effects: Vec<Effect>) -> Transition {
    effects.push(Effect::StatusChanged {
        from: SessionStatus::Active,
        to: SessionStatus::Completed,
    });
    effects.push(Effect::Finalize { champion });
    Transition {
        phase: SessionPhase::Completed(bracket),
        effects,
    }
}

/// One user's tournament over one category
#[derive(Debug, Clone)]
pub struct TournamentSession {
    pub id: Uuid,
    pub user_id: String,
    pub category: String,
    pub tournament_size: u32,
    pub phase: SessionPhase,
    /// When the current matchup was shown; drives observed latency
    pub matchup_started_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by every committed mutation
    pub version: i64,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TournamentSession {
    pub fn status(&self) -> SessionStatus {
        self.phase.status()
    }

    pub fn bracket(&self) -> &Bracket {
        self.phase.bracket()
    }

    pub fn current_matchup(&self) -> Option<Matchup> {
        self.bracket().current_matchup()
    }

    pub fn progress_percentage(&self) -> u32 {
        self.bracket().progress_percentage()
    }

    /// Flat view for display and JSON output
    pub fn snapshot(&self) -> SessionSnapshot {
        let bracket = self.bracket();
        SessionSnapshot {
            id: self.id,
            user_id: self.user_id.clone(),
            category: self.category.clone(),
            status: self.status(),
            tournament_size: self.tournament_size,
            current_round: bracket.current_round(),
            total_rounds: bracket.total_rounds(),
            progress_percentage: bracket.progress_percentage(),
            remaining_queue: bracket.remaining().to_vec(),
            eliminated_history: bracket.eliminated().to_vec(),
            current_matchup: bracket.current_matchup(),
            champion_id: match self.phase {
                SessionPhase::Completed(_) => bracket.champion(),
                _ => None,
            },
            version: self.version,
            started_at: self.started_at,
            last_activity_at: self.last_activity_at,
            completed_at: self.completed_at,
        }
    }
}

/// Serializable session view
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub user_id: String,
    pub category: String,
    pub status: SessionStatus,
    pub tournament_size: u32,
    pub current_round: u32,
    pub total_rounds: u32,
    pub progress_percentage: u32,
    pub remaining_queue: Vec<Uuid>,
    pub eliminated_history: Vec<Uuid>,
    pub current_matchup: Option<Matchup>,
    pub champion_id: Option<Uuid>,
    pub version: i64,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// What `get_current_matchup` hands back
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MatchupView {
    Pending {
        session_id: Uuid,
        option_a: CandidateImage,
        option_b: CandidateImage,
        current_round: u32,
        total_rounds: u32,
        progress_percentage: u32,
        remaining: usize,
    },
    Finished {
        session_id: Uuid,
        champion_id: Uuid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(n: usize) -> (Vec<Uuid>, SessionPhase) {
        let ids: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        let bracket = Bracket::new(ids.clone()).unwrap();
        (ids, SessionPhase::Active(bracket))
    }

    #[test]
    fn test_ensure_matchup_generates_once() {
        let (ids, phase) = fresh(4);
        let t = phase.apply(SessionCommand::EnsureMatchup).unwrap();
        assert_eq!(
            t.effects,
            vec![Effect::MatchupStarted(Matchup {
                option_a: ids[0],
                option_b: ids[1]
            })]
        );

        let again = t.phase.apply(SessionCommand::EnsureMatchup).unwrap();
        assert!(again.is_noop());
    }

    #[test]
    fn test_pause_resume_preserves_matchup() {
        let (_, phase) = fresh(4);
        let t = phase.apply(SessionCommand::EnsureMatchup).unwrap();
        let matchup = t.phase.bracket().current_matchup();

        let paused = t.phase.apply(SessionCommand::Pause).unwrap();
        assert_eq!(paused.phase.status(), SessionStatus::Paused);
        assert_eq!(
            paused.effects,
            vec![Effect::StatusChanged {
                from: SessionStatus::Active,
                to: SessionStatus::Paused
            }]
        );

        let resumed = paused.phase.apply(SessionCommand::Resume).unwrap();
        assert_eq!(resumed.phase.status(), SessionStatus::Active);
        assert_eq!(resumed.phase.bracket().current_matchup(), matchup);
    }

    #[test]
    fn test_paused_session_rejects_choices() {
        let (ids, phase) = fresh(4);
        let t = phase.apply(SessionCommand::EnsureMatchup).unwrap();
        let paused = t.phase.apply(SessionCommand::Pause).unwrap().phase;

        for cmd in [
            SessionCommand::Choose { winner: ids[0] },
            SessionCommand::EnsureMatchup,
            SessionCommand::Pause,
            SessionCommand::Abandon,
            SessionCommand::Finalize,
        ] {
            assert!(
                matches!(paused.clone().apply(cmd), Err(Error::InvalidState(_))),
                "{:?} should be rejected while paused",
                cmd
            );
        }
    }

    #[test]
    fn test_final_choice_completes_and_finalizes() {
        let (ids, phase) = fresh(4);
        let mut phase = phase.apply(SessionCommand::EnsureMatchup).unwrap().phase;

        for _ in 0..2 {
            let m = phase.bracket().current_matchup().unwrap();
            let t = phase.apply(SessionCommand::Choose { winner: m.option_b }).unwrap();
            assert_eq!(t.phase.status(), SessionStatus::Active);
            phase = t.phase;
        }

        let m = phase.bracket().current_matchup().unwrap();
        let t = phase.apply(SessionCommand::Choose { winner: m.option_a }).unwrap();
        assert_eq!(t.phase.status(), SessionStatus::Completed);
        assert!(matches!(t.effects[0], Effect::ChoiceMade(_)));
        assert_eq!(
            t.effects.last(),
            Some(&Effect::Finalize { champion: ids[2] })
        );

        // Completed sessions accept Finalize as a no-op and nothing else
        let again = t.phase.clone().apply(SessionCommand::Finalize).unwrap();
        assert!(again.is_noop());
        assert!(matches!(
            t.phase.apply(SessionCommand::Abandon),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_abandoned_is_terminal() {
        let (_, phase) = fresh(4);
        let abandoned = phase.apply(SessionCommand::Abandon).unwrap().phase;
        assert_eq!(abandoned.status(), SessionStatus::Abandoned);
        assert!(abandoned.clone().apply(SessionCommand::Resume).is_err());
        assert!(abandoned.apply(SessionCommand::Finalize).is_err());
    }

    #[test]
    fn test_finalize_before_collapse_rejected() {
        let (_, phase) = fresh(4);
        assert!(matches!(
            phase.apply(SessionCommand::Finalize),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_completed_status_requires_collapsed_bracket() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let bracket = Bracket::new(ids).unwrap();
        assert!(SessionPhase::from_parts(SessionStatus::Completed, bracket).is_err());
    }
}
