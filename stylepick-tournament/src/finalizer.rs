//! Result finalizer
//!
//! Pure derivation of a [`TournamentResult`] from a collapsed session and
//! its choice ledger. The transactional write lives in the service.

use crate::models::{
    Choice, DominantPreference, PreferenceStrength, StyleProfile, TournamentResult,
    TournamentSession,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use stylepick_common::time::millis_between;
use stylepick_common::{Error, Result};
use uuid::Uuid;

/// Score used when there is nothing to measure
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Knobs the finalizer reads from runtime settings
#[derive(Debug, Clone, Copy)]
pub struct FinalizeOptions {
    pub dominant_top_k: usize,
    pub completed_at: DateTime<Utc>,
}

/// Build the result for a session whose bracket has collapsed
///
/// `choices` are this session's ledger in sequence order; `prior_choices`
/// are the same user's decisions from earlier completed tournaments in
/// the same category, oldest first.
pub fn compute_result(
    session: &TournamentSession,
    choices: &[Choice],
    prior_choices: &[Choice],
    options: FinalizeOptions,
) -> Result<TournamentResult> {
    let bracket = session.bracket();
    let champion_id = bracket.champion().ok_or_else(|| {
        Error::InvalidState(format!(
            "Session {} has {} candidates remaining",
            session.id,
            bracket.remaining().len()
        ))
    })?;

    let eliminated = bracket.eliminated();
    let finalist_id = *eliminated
        .last()
        .ok_or_else(|| Error::Internal("Collapsed bracket has no eliminations".to_string()))?;
    let semifinalists = semifinalists(eliminated);

    let total_choices = choices.len() as u32;
    let speed_bonus_count = choices.iter().filter(|c| c.is_speed_bonus).count() as u32;
    let preference_strength = if choices.is_empty() {
        NEUTRAL_SCORE
    } else {
        f64::from(speed_bonus_count) / f64::from(total_choices)
    };
    let decision_speed_avg_ms = if choices.is_empty() {
        0.0
    } else {
        choices.iter().map(|c| c.response_time_ms as f64).sum::<f64>() / choices.len() as f64
    };
    let (consistency_score, consistency_samples) = consistency(choices, prior_choices);

    let mut top_choices = Vec::with_capacity(2 + semifinalists.len());
    top_choices.push(champion_id);
    top_choices.push(finalist_id);
    top_choices.extend(semifinalists.iter().copied());

    let style_profile = StyleProfile {
        category: session.category.clone(),
        champion_id,
        top_choices,
        elimination_order: eliminated.to_vec(),
        strength: PreferenceStrength::from_score(preference_strength),
        decisiveness: decisiveness(choices),
    };

    Ok(TournamentResult {
        id: Uuid::new_v4(),
        session_id: session.id,
        user_id: session.user_id.clone(),
        category: session.category.clone(),
        champion_id,
        finalist_id,
        semifinalists,
        elimination_order: eliminated.to_vec(),
        preference_strength,
        consistency_score,
        consistency_samples,
        decision_speed_avg_ms,
        dominant_preferences: dominant_preferences(choices, options.dominant_top_k),
        total_choices,
        speed_bonus_count,
        rounds_played: bracket.current_round(),
        tournament_size: session.tournament_size,
        total_time_ms: millis_between(&session.started_at, &options.completed_at),
        style_profile,
        completed_at: options.completed_at,
    })
}

/// Up to three ids eliminated just before the finalist, most recent first
pub fn semifinalists(eliminated: &[Uuid]) -> Vec<Uuid> {
    let Some((_, before_finalist)) = eliminated.split_last() else {
        return Vec::new();
    };
    before_finalist.iter().rev().take(3).copied().collect()
}

/// Winners ranked by win count, ties broken by the most recent win
pub fn dominant_preferences(choices: &[Choice], top_k: usize) -> Vec<DominantPreference> {
    // image -> (wins, sequence of latest win)
    let mut tally: HashMap<Uuid, (u32, u32)> = HashMap::new();
    for choice in choices {
        let entry = tally.entry(choice.winner_id).or_insert((0, 0));
        entry.0 += 1;
        entry.1 = entry.1.max(choice.sequence);
    }

    let mut ranked: Vec<(Uuid, u32, u32)> = tally
        .into_iter()
        .map(|(id, (wins, last))| (id, wins, last))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));

    ranked
        .into_iter()
        .take(top_k)
        .map(|(image_id, wins, _)| DominantPreference { image_id, wins })
        .collect()
}

/// Agreement with earlier decisions on the same unordered pairs
///
/// When a pair was decided more than once before, the latest decision
/// counts. Returns the neutral score with zero samples when no pair repeats.
pub fn consistency(choices: &[Choice], prior_choices: &[Choice]) -> (f64, u32) {
    let mut previous: HashMap<(Uuid, Uuid), Uuid> = HashMap::new();
    for choice in prior_choices {
        previous.insert(choice.unordered_pair(), choice.winner_id);
    }

    let mut samples = 0u32;
    let mut agreed = 0u32;
    for choice in choices {
        if let Some(winner) = previous.get(&choice.unordered_pair()) {
            samples += 1;
            if *winner == choice.winner_id {
                agreed += 1;
            }
        }
    }

    if samples == 0 {
        (NEUTRAL_SCORE, 0)
    } else {
        (f64::from(agreed) / f64::from(samples), samples)
    }
}

fn decisiveness(choices: &[Choice]) -> Option<f64> {
    let levels: Vec<f64> = choices
        .iter()
        .filter_map(|c| c.confidence_level.map(|l| l.normalized()))
        .collect();
    if levels.is_empty() {
        None
    } else {
        Some(levels.iter().sum::<f64>() / levels.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::Bracket;
    use crate::models::{ChoiceSubmission, ConfidenceLevel, Effect, SessionCommand, SessionPhase};
    use chrono::Duration;

    /// Play a bracket to the end, `pick` choosing the winner of each matchup
    fn play(
        ids: &[Uuid],
        response_ms: &[u64],
        mut pick: impl FnMut(Uuid, Uuid) -> Uuid,
    ) -> (TournamentSession, Vec<Choice>) {
        let started_at = Utc::now() - Duration::seconds(30);
        let session_id = Uuid::new_v4();
        let mut phase = SessionPhase::Active(Bracket::new(ids.to_vec()).unwrap())
            .apply(SessionCommand::EnsureMatchup)
            .unwrap()
            .phase;
        let mut choices = Vec::new();

        while let Some(m) = phase.bracket().current_matchup() {
            let winner = pick(m.option_a, m.option_b);
            let t = phase.apply(SessionCommand::Choose { winner }).unwrap();
            let Some(Effect::ChoiceMade(reduction)) = t.effects.first().cloned() else {
                panic!("choice produced no reduction");
            };
            let submission = ChoiceSubmission {
                matchup: m,
                winner_id: winner,
                response_time_ms: response_ms[choices.len() % response_ms.len()],
                confidence_level: Some(ConfidenceLevel::new(5).unwrap()),
            };
            choices.push(Choice::from_reduction(
                session_id,
                choices.len() as u32 + 1,
                &reduction,
                &submission,
                3000,
                None,
                Utc::now(),
            ));
            phase = t.phase;
        }

        let session = TournamentSession {
            id: session_id,
            user_id: "user-1".to_string(),
            category: "sala".to_string(),
            tournament_size: ids.len() as u32,
            phase,
            matchup_started_at: None,
            version: 0,
            started_at,
            last_activity_at: Utc::now(),
            completed_at: None,
        };
        (session, choices)
    }

    fn options() -> FinalizeOptions {
        FinalizeOptions {
            dominant_top_k: 5,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_four_candidate_result() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);
        let script = [a, c, d];
        let mut step = 0;
        let (session, choices) = play(&ids, &[1000, 5000], |_, _| {
            step += 1;
            script[step - 1]
        });

        let result = compute_result(&session, &choices, &[], options()).unwrap();
        assert_eq!(result.champion_id, d);
        assert_eq!(result.finalist_id, c);
        assert_eq!(result.semifinalists, vec![a, b]);
        assert_eq!(result.elimination_order, vec![b, a, c]);
        assert_eq!(result.total_choices, 3);
        assert_eq!(result.speed_bonus_count, 2);
        assert!((result.preference_strength - 2.0 / 3.0).abs() < 1e-9);
        assert!((result.decision_speed_avg_ms - 7000.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.consistency_score, NEUTRAL_SCORE);
        assert_eq!(result.consistency_samples, 0);
        assert_eq!(result.rounds_played, 2);
        assert!(result.total_time_ms >= 30_000);
        assert_eq!(result.style_profile.top_choices, vec![d, c, a, b]);
        assert_eq!(result.style_profile.strength, PreferenceStrength::Strong);
        assert_eq!(result.style_profile.decisiveness, Some(1.0));
    }

    #[test]
    fn test_unfinished_session_rejected() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let (mut session, choices) = play(&ids, &[1000], |a, _| a);
        session.phase = SessionPhase::Active(Bracket::new(ids).unwrap());
        assert!(matches!(
            compute_result(&session, &choices, &[], options()),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_dominant_preferences_tie_break_on_recency() {
        let ids: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        // Left side always wins: ids[0] sweeps
        let (_, choices) = play(&ids, &[1000], |a, _| a);
        let dominant = dominant_preferences(&choices, 2);
        assert_eq!(dominant.len(), 1);
        assert_eq!(dominant[0], DominantPreference { image_id: ids[0], wins: 7 });

        // Right side always wins: every winner has one more win than the last
        let (_, choices) = play(&ids, &[1000], |_, b| b);
        let dominant = dominant_preferences(&choices, 3);
        assert_eq!(dominant[0].image_id, ids[7]);
        assert_eq!(dominant[0].wins, 1);
        // All single-win ties: the latest winner ranks first
        let mut winners: Vec<Uuid> = choices.iter().rev().map(|c| c.winner_id).collect();
        winners.truncate(3);
        assert_eq!(
            dominant.iter().map(|d| d.image_id).collect::<Vec<_>>(),
            winners
        );
    }

    #[test]
    fn test_consistency_against_prior_tournament() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let (_, prior) = play(&ids, &[1000], |a, _| a);
        let (_, same) = play(&ids, &[1000], |a, _| a);
        let (_, flipped) = play(&ids, &[1000], |_, b| b);

        assert_eq!(consistency(&same, &prior), (1.0, 3));

        // First pair (ids[0], ids[1]) repeats and disagrees; later pairs differ
        let (score, samples) = consistency(&flipped, &prior);
        assert_eq!(samples, 1);
        assert_eq!(score, 0.0);

        assert_eq!(consistency(&same, &[]), (NEUTRAL_SCORE, 0));
    }

    #[test]
    fn test_semifinalists_clamped() {
        let ids: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
        assert_eq!(semifinalists(&ids[..1]), Vec::<Uuid>::new());
        assert_eq!(semifinalists(&ids[..2]), vec![ids[0]]);
        assert_eq!(semifinalists(&ids), vec![ids[4], ids[3], ids[2]]);
    }
}
