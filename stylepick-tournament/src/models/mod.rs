//! Data models for the tournament service
//!
//! - Candidate images as seen through the catalog boundary
//! - Tournament session and its lifecycle state machine
//! - Choice ledger entries
//! - Finalized results and style profiles

pub mod candidate;
pub mod choice;
pub mod result;
pub mod session;

pub use candidate::{CandidateImage, CategorySummary, NewCandidateImage};
pub use choice::{Choice, ChoiceSubmission, ConfidenceLevel, MAX_RESPONSE_TIME_MS};
pub use result::{DominantPreference, PreferenceStrength, ResultPage, StyleProfile, TournamentResult};
pub use session::{Effect, MatchupView, SessionCommand, SessionPhase, TournamentSession, Transition};
