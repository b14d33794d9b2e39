//! Choice ledger entries
//!
//! One immutable record per resolved matchup.

use crate::bracket::{Matchup, Reduction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stylepick_common::{Error, Result};
use uuid::Uuid;

/// Self-reported confidence, 1 (unsure) to 5 (certain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ConfidenceLevel(u8);

impl ConfidenceLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(level: u8) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&level) {
            return Err(Error::InvalidInput(format!(
                "Confidence level must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                level
            )));
        }
        Ok(Self(level))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Map 1..=5 onto 0.0..=1.0
    pub fn normalized(&self) -> f64 {
        f64::from(self.0 - Self::MIN) / f64::from(Self::MAX - Self::MIN)
    }
}

impl TryFrom<u8> for ConfidenceLevel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ConfidenceLevel> for u8 {
    fn from(level: ConfidenceLevel) -> Self {
        level.0
    }
}

/// Largest response time the ledger can store
pub const MAX_RESPONSE_TIME_MS: u64 = i64::MAX as u64;

/// Caller input for one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChoiceSubmission {
    /// The pair the caller was shown; must still be the session's matchup
    pub matchup: Matchup,
    pub winner_id: Uuid,
    pub response_time_ms: u64,
    pub confidence_level: Option<ConfidenceLevel>,
}

impl ChoiceSubmission {
    /// Reject values the ledger cannot hold
    pub fn validate(&self) -> Result<()> {
        if self.response_time_ms > MAX_RESPONSE_TIME_MS {
            return Err(Error::InvalidInput(format!(
                "Response time {} ms exceeds {} ms",
                self.response_time_ms, MAX_RESPONSE_TIME_MS
            )));
        }
        Ok(())
    }
}

/// Recorded decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: Uuid,
    pub session_id: Uuid,
    /// 1-based position in the session's ledger
    pub sequence: u32,
    pub round_number: u32,
    pub option_a_id: Uuid,
    pub option_b_id: Uuid,
    pub winner_id: Uuid,
    pub loser_id: Uuid,
    /// Client-reported decision time
    pub response_time_ms: u64,
    /// Server-side time between matchup display and submission
    pub observed_latency_ms: Option<u64>,
    pub confidence_level: Option<ConfidenceLevel>,
    pub is_speed_bonus: bool,
    pub chosen_at: DateTime<Utc>,
}

impl Choice {
    /// Ledger entry for a reduction step
    pub fn from_reduction(
        session_id: Uuid,
        sequence: u32,
        reduction: &Reduction,
        submission: &ChoiceSubmission,
        speed_bonus_threshold_ms: u64,
        observed_latency_ms: Option<u64>,
        chosen_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            sequence,
            round_number: reduction.round_number,
            option_a_id: reduction.option_a,
            option_b_id: reduction.option_b,
            winner_id: reduction.winner,
            loser_id: reduction.loser,
            response_time_ms: submission.response_time_ms,
            observed_latency_ms,
            confidence_level: submission.confidence_level,
            is_speed_bonus: submission.response_time_ms < speed_bonus_threshold_ms,
            chosen_at,
        }
    }

    /// Pair key that ignores presentation order
    pub fn unordered_pair(&self) -> (Uuid, Uuid) {
        if self.option_a_id <= self.option_b_id {
            (self.option_a_id, self.option_b_id)
        } else {
            (self.option_b_id, self.option_a_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_bounds() {
        assert!(ConfidenceLevel::new(0).is_err());
        assert!(ConfidenceLevel::new(6).is_err());
        assert_eq!(ConfidenceLevel::new(1).unwrap().normalized(), 0.0);
        assert_eq!(ConfidenceLevel::new(5).unwrap().normalized(), 1.0);
        assert_eq!(ConfidenceLevel::new(3).unwrap().normalized(), 0.5);
    }

    #[test]
    fn test_confidence_serde_validates() {
        let level: ConfidenceLevel = serde_json::from_str("4").unwrap();
        assert_eq!(level.get(), 4);
        assert!(serde_json::from_str::<ConfidenceLevel>("9").is_err());
    }

    #[test]
    fn test_speed_bonus_threshold_is_exclusive() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let reduction = Reduction {
            option_a: a,
            option_b: b,
            winner: a,
            loser: b,
            round_number: 1,
            remaining: 3,
        };
        let mut submission = ChoiceSubmission {
            matchup: Matchup {
                option_a: a,
                option_b: b,
            },
            winner_id: a,
            response_time_ms: 2999,
            confidence_level: None,
        };
        let fast = Choice::from_reduction(Uuid::new_v4(), 1, &reduction, &submission, 3000, None, Utc::now());
        assert!(fast.is_speed_bonus);

        submission.response_time_ms = 3000;
        let slow = Choice::from_reduction(Uuid::new_v4(), 1, &reduction, &submission, 3000, None, Utc::now());
        assert!(!slow.is_speed_bonus);
        assert_eq!(slow.unordered_pair(), fast.unordered_pair());
    }

    #[test]
    fn test_response_time_must_fit_ledger() {
        let matchup = Matchup {
            option_a: Uuid::new_v4(),
            option_b: Uuid::new_v4(),
        };
        let mut submission = ChoiceSubmission {
            matchup,
            winner_id: matchup.option_a,
            response_time_ms: MAX_RESPONSE_TIME_MS,
            confidence_level: None,
        };
        assert!(submission.validate().is_ok());

        submission.response_time_ms = u64::MAX;
        assert!(matches!(submission.validate(), Err(Error::InvalidInput(_))));
    }
}
