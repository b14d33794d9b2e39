//! Finalized tournament results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How often an image won within one tournament
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DominantPreference {
    pub image_id: Uuid,
    pub wins: u32,
}

/// Bucketed preference strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceStrength {
    Strong,
    Moderate,
    Weak,
}

impl PreferenceStrength {
    /// ≥ 0.6 strong, ≥ 0.3 moderate, otherwise weak
    pub fn from_score(score: f64) -> Self {
        if score >= 0.6 {
            PreferenceStrength::Strong
        } else if score >= 0.3 {
            PreferenceStrength::Moderate
        } else {
            PreferenceStrength::Weak
        }
    }
}

/// Per-category summary handed to the recommendation side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub category: String,
    pub champion_id: Uuid,
    /// Champion, finalist, then semifinalists
    pub top_choices: Vec<Uuid>,
    /// Earliest elimination first
    pub elimination_order: Vec<Uuid>,
    pub strength: PreferenceStrength,
    /// Mean normalized confidence, when any was reported
    pub decisiveness: Option<f64>,
}

/// Immutable summary of a completed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentResult {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: String,
    pub category: String,
    pub champion_id: Uuid,
    pub finalist_id: Uuid,
    /// Up to three, most recently eliminated first
    pub semifinalists: Vec<Uuid>,
    pub elimination_order: Vec<Uuid>,
    /// Fraction of decisions made under the speed-bonus threshold
    pub preference_strength: f64,
    /// Agreement with the user's earlier decisions on the same pairs
    pub consistency_score: f64,
    pub consistency_samples: u32,
    pub decision_speed_avg_ms: f64,
    pub dominant_preferences: Vec<DominantPreference>,
    pub total_choices: u32,
    pub speed_bonus_count: u32,
    pub rounds_played: u32,
    pub tournament_size: u32,
    pub total_time_ms: u64,
    pub style_profile: StyleProfile,
    pub completed_at: DateTime<Utc>,
}

/// One page of a user's history
#[derive(Debug, Clone, Serialize)]
pub struct ResultPage {
    pub results: Vec<TournamentResult>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_buckets() {
        assert_eq!(PreferenceStrength::from_score(0.9), PreferenceStrength::Strong);
        assert_eq!(PreferenceStrength::from_score(0.6), PreferenceStrength::Strong);
        assert_eq!(PreferenceStrength::from_score(0.45), PreferenceStrength::Moderate);
        assert_eq!(PreferenceStrength::from_score(0.1), PreferenceStrength::Weak);
    }
}
