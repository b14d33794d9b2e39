//! Bracket reduction engine
//!
//! Sequential single-elimination: the matchup is always the first two
//! entries of the remaining queue. The loser leaves the queue and is
//! appended to the elimination history, the winner keeps its position.
//! Every candidate is therefore in exactly one of the two lists, and a
//! bracket of N candidates collapses to a champion after N−1 choices.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use stylepick_common::{Error, Result};
use uuid::Uuid;

/// Smallest bracket that can be started
pub const MIN_TOURNAMENT_SIZE: usize = 4;

/// Largest bracket that can be requested
pub const MAX_TOURNAMENT_SIZE: usize = 128;

/// Default requested bracket size
pub const DEFAULT_TOURNAMENT_SIZE: usize = 16;

/// Reject requested sizes outside {4, 8, 16, 32, 64, 128}
pub fn validate_requested_size(requested: usize) -> Result<()> {
    if !requested.is_power_of_two()
        || !(MIN_TOURNAMENT_SIZE..=MAX_TOURNAMENT_SIZE).contains(&requested)
    {
        return Err(Error::InvalidInput(format!(
            "Tournament size must be a power of two between {} and {}, got {}",
            MIN_TOURNAMENT_SIZE, MAX_TOURNAMENT_SIZE, requested
        )));
    }
    Ok(())
}

/// Largest power of two that is ≤ both `available` and `requested`
///
/// Fails with `ResourceExhausted` when fewer than four candidates exist.
pub fn bracket_size(available: usize, requested: usize) -> Result<usize> {
    validate_requested_size(requested)?;

    let bound = available.min(requested);
    if bound < MIN_TOURNAMENT_SIZE {
        return Err(Error::ResourceExhausted(format!(
            "Need at least {} candidates, only {} available",
            MIN_TOURNAMENT_SIZE, available
        )));
    }

    // bound ≥ 4, so the leading bit is well defined
    Ok(1usize << (usize::BITS - 1 - bound.leading_zeros()))
}

/// ceil(log2(size))
pub fn total_rounds_for(size: usize) -> u32 {
    if size <= 1 {
        0
    } else {
        usize::BITS - (size - 1).leading_zeros()
    }
}

/// The pair currently awaiting a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matchup {
    pub option_a: Uuid,
    pub option_b: Uuid,
}

impl Matchup {
    pub fn contains(&self, id: Uuid) -> bool {
        self.option_a == id || self.option_b == id
    }
}

/// Outcome of one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reduction {
    pub option_a: Uuid,
    pub option_b: Uuid,
    pub winner: Uuid,
    pub loser: Uuid,
    /// Round in effect when the choice was made
    pub round_number: u32,
    /// Queue length after the loser was removed
    pub remaining: usize,
}

/// Reduction state of one tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    remaining: Vec<Uuid>,
    eliminated: Vec<Uuid>,
    current_matchup: Option<Matchup>,
    current_round: u32,
    total_rounds: u32,
}

impl Bracket {
    /// Fresh bracket over `candidates` (order preserved)
    pub fn new(candidates: Vec<Uuid>) -> Result<Self> {
        if candidates.len() < 2 {
            return Err(Error::InvalidInput(format!(
                "A bracket needs at least two candidates, got {}",
                candidates.len()
            )));
        }
        let unique: HashSet<&Uuid> = candidates.iter().collect();
        if unique.len() != candidates.len() {
            return Err(Error::InvalidInput(
                "Bracket candidates must be distinct".to_string(),
            ));
        }

        let total_rounds = total_rounds_for(candidates.len());
        Ok(Self {
            remaining: candidates,
            eliminated: Vec::new(),
            current_matchup: None,
            current_round: 1,
            total_rounds,
        })
    }

    /// Rebuild a bracket from persisted state, checking its invariants
    pub fn restore(
        remaining: Vec<Uuid>,
        eliminated: Vec<Uuid>,
        current_matchup: Option<Matchup>,
        current_round: u32,
        total_rounds: u32,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for id in remaining.iter().chain(eliminated.iter()) {
            if !seen.insert(*id) {
                return Err(Error::Internal(format!(
                    "Candidate {} appears more than once in stored bracket",
                    id
                )));
            }
        }
        if remaining.is_empty() {
            return Err(Error::Internal("Stored bracket has no candidates".to_string()));
        }
        if let Some(m) = current_matchup {
            if remaining.len() < 2 || remaining[0] != m.option_a || remaining[1] != m.option_b {
                return Err(Error::Internal(
                    "Stored matchup does not match the head of the queue".to_string(),
                ));
            }
        }
        if current_round == 0 || current_round > total_rounds.max(1) {
            return Err(Error::Internal(format!(
                "Stored round {} outside 1..={}",
                current_round, total_rounds
            )));
        }

        Ok(Self {
            remaining,
            eliminated,
            current_matchup,
            current_round,
            total_rounds,
        })
    }

    pub fn remaining(&self) -> &[Uuid] {
        &self.remaining
    }

    /// Eliminated candidates, earliest first
    pub fn eliminated(&self) -> &[Uuid] {
        &self.eliminated
    }

    pub fn current_matchup(&self) -> Option<Matchup> {
        self.current_matchup
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Number of candidates the bracket started with
    pub fn size(&self) -> usize {
        self.remaining.len() + self.eliminated.len()
    }

    /// True once a single candidate is left
    pub fn is_collapsed(&self) -> bool {
        self.remaining.len() == 1
    }

    pub fn champion(&self) -> Option<Uuid> {
        if self.is_collapsed() {
            self.remaining.first().copied()
        } else {
            None
        }
    }

    /// Ensure a matchup is set when one is possible
    ///
    /// Returns `Some` only when a new matchup was generated. An existing
    /// matchup is left untouched; a collapsed bracket yields `None`.
    pub fn generate_matchup(&mut self) -> Option<Matchup> {
        if self.current_matchup.is_some() || self.remaining.len() < 2 {
            return None;
        }
        let matchup = Matchup {
            option_a: self.remaining[0],
            option_b: self.remaining[1],
        };
        self.current_matchup = Some(matchup);
        Some(matchup)
    }

    /// Resolve the current matchup in favour of `winner`
    pub fn apply_choice(&mut self, winner: Uuid) -> Result<Reduction> {
        let matchup = self.current_matchup.ok_or_else(|| {
            Error::InvalidInput("No matchup is awaiting a decision".to_string())
        })?;
        if !matchup.contains(winner) {
            return Err(Error::InvalidInput(format!(
                "Winner {} is not part of the current matchup",
                winner
            )));
        }

        let loser = if winner == matchup.option_a {
            matchup.option_b
        } else {
            matchup.option_a
        };

        // The matchup is always the queue head, so the loser sits at index 0 or 1
        let position = self
            .remaining
            .iter()
            .take(2)
            .position(|id| *id == loser)
            .ok_or_else(|| Error::Internal("Matchup loser missing from queue head".to_string()))?;
        self.remaining.remove(position);
        self.eliminated.push(loser);
        self.current_matchup = None;

        let round_number = self.current_round;
        self.advance_round();

        Ok(Reduction {
            option_a: matchup.option_a,
            option_b: matchup.option_b,
            winner,
            loser,
            round_number,
            remaining: self.remaining.len(),
        })
    }

    fn advance_round(&mut self) {
        if self.current_round >= self.total_rounds {
            return;
        }
        let threshold = 1usize << (self.total_rounds - self.current_round);
        if self.remaining.len() <= threshold {
            self.current_round += 1;
        }
    }

    /// Every original candidate sits in exactly one of remaining/eliminated
    pub fn check_partition(&self, original: &[Uuid]) -> Result<()> {
        let expected: HashSet<&Uuid> = original.iter().collect();
        let mut seen = HashSet::new();
        for id in self.remaining.iter().chain(self.eliminated.iter()) {
            if !expected.contains(id) || !seen.insert(id) {
                return Err(Error::Internal(format!(
                    "Candidate {} breaks the bracket partition",
                    id
                )));
            }
        }
        if seen.len() != expected.len() {
            return Err(Error::Internal(format!(
                "Bracket holds {} of {} candidates",
                seen.len(),
                expected.len()
            )));
        }
        Ok(())
    }

    /// round((current_round − 1) / total_rounds × 100), or 100 once collapsed
    pub fn progress_percentage(&self) -> u32 {
        if self.is_collapsed() || self.total_rounds == 0 {
            return 100;
        }
        let ratio = f64::from(self.current_round - 1) / f64::from(self.total_rounds);
        (ratio * 100.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn test_requested_size_validation() {
        for ok in [4, 8, 16, 32, 64, 128] {
            assert!(validate_requested_size(ok).is_ok(), "{} should be accepted", ok);
        }
        for bad in [0, 2, 3, 5, 12, 256] {
            assert!(matches!(
                validate_requested_size(bad),
                Err(Error::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_bracket_size_picks_largest_power_of_two() {
        assert_eq!(bracket_size(10, 16).unwrap(), 8);
        assert_eq!(bracket_size(100, 16).unwrap(), 16);
        assert_eq!(bracket_size(4, 128).unwrap(), 4);
        assert_eq!(bracket_size(127, 128).unwrap(), 64);
        assert!(matches!(bracket_size(3, 16), Err(Error::ResourceExhausted(_))));
    }

    #[test]
    fn test_total_rounds() {
        assert_eq!(total_rounds_for(4), 2);
        assert_eq!(total_rounds_for(8), 3);
        assert_eq!(total_rounds_for(128), 7);
        assert_eq!(total_rounds_for(5), 3);
    }

    #[test]
    fn test_new_rejects_duplicates() {
        let a = Uuid::new_v4();
        assert!(Bracket::new(vec![a, a, Uuid::new_v4(), Uuid::new_v4()]).is_err());
        assert!(Bracket::new(vec![a]).is_err());
    }

    #[test]
    fn test_sequential_reduction_walkthrough() {
        let c = ids(4);
        let (a, b, cc, d) = (c[0], c[1], c[2], c[3]);
        let mut bracket = Bracket::new(c.clone()).unwrap();

        let m = bracket.generate_matchup().unwrap();
        assert_eq!((m.option_a, m.option_b), (a, b));

        let r = bracket.apply_choice(a).unwrap();
        assert_eq!(r.loser, b);
        assert_eq!(bracket.remaining(), &[a, cc, d]);
        assert_eq!(bracket.eliminated(), &[b]);
        assert_eq!(bracket.current_round(), 1);

        let m = bracket.generate_matchup().unwrap();
        assert_eq!((m.option_a, m.option_b), (a, cc));
        bracket.apply_choice(cc).unwrap();
        assert_eq!(bracket.remaining(), &[cc, d]);
        assert_eq!(bracket.current_round(), 2);
        assert_eq!(bracket.progress_percentage(), 50);

        bracket.generate_matchup().unwrap();
        let r = bracket.apply_choice(d).unwrap();
        assert_eq!(r.round_number, 2);
        assert_eq!(bracket.champion(), Some(d));
        assert_eq!(bracket.eliminated(), &[b, a, cc]);
        assert_eq!(bracket.progress_percentage(), 100);
        assert!(bracket.generate_matchup().is_none());
    }

    #[test]
    fn test_sixteen_candidates_need_fifteen_choices() {
        let c = ids(16);
        let mut bracket = Bracket::new(c.clone()).unwrap();
        let mut choices = 0;

        while let Some(m) = bracket.generate_matchup() {
            // Alternate which side wins
            let winner = if choices % 2 == 0 { m.option_a } else { m.option_b };
            bracket.apply_choice(winner).unwrap();
            choices += 1;

            bracket.check_partition(&c).unwrap();
            assert!(bracket.current_round() <= bracket.total_rounds());
        }

        assert_eq!(choices, 15);
        assert!(bracket.is_collapsed());
        assert_eq!(bracket.current_round(), 4);
    }

    #[test]
    fn test_choice_outside_matchup_rejected_without_mutation() {
        let c = ids(4);
        let mut bracket = Bracket::new(c.clone()).unwrap();
        bracket.generate_matchup();
        let before = bracket.clone();

        assert!(matches!(
            bracket.apply_choice(c[3]),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(bracket, before);
    }

    #[test]
    fn test_choice_without_matchup_rejected() {
        let mut bracket = Bracket::new(ids(4)).unwrap();
        let first = bracket.remaining()[0];
        assert!(matches!(
            bracket.apply_choice(first),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_generate_matchup_keeps_existing() {
        let mut bracket = Bracket::new(ids(4)).unwrap();
        let first = bracket.generate_matchup();
        assert!(first.is_some());
        assert!(bracket.generate_matchup().is_none());
        assert_eq!(bracket.current_matchup(), first);
    }

    #[test]
    fn test_check_partition_detects_foreign_ids() {
        let c = ids(4);
        let bracket = Bracket::new(c.clone()).unwrap();
        assert!(bracket.check_partition(&c).is_ok());
        assert!(bracket.check_partition(&c[..3]).is_err());
        assert!(bracket.check_partition(&ids(4)).is_err());
    }

    #[test]
    fn test_restore_rejects_inconsistent_state() {
        let c = ids(4);
        let mismatched = Matchup {
            option_a: c[1],
            option_b: c[0],
        };
        assert!(Bracket::restore(c.clone(), vec![], Some(mismatched), 1, 2).is_err());
        assert!(Bracket::restore(c.clone(), vec![c[0]], None, 1, 2).is_err());
        assert!(Bracket::restore(c.clone(), vec![], None, 3, 2).is_err());

        let good = Matchup {
            option_a: c[0],
            option_b: c[1],
        };
        let restored = Bracket::restore(c.clone(), vec![], Some(good), 1, 2).unwrap();
        assert_eq!(restored.current_matchup(), Some(good));
    }
}
