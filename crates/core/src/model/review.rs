use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::LearningState;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors that can occur while reading a rating submitted by a learner.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RatingError {
    #[error("unknown rating: {0:?} (expected again, good or easy)")]
    Unknown(String),
}

//
// ─── RATING ───────────────────────────────────────────────────────────────────
//

/// Coarse self-assessment given by the learner after revealing the answer.
///
/// - `Again`: failed to recall; counts as a lapse.
/// - `Good`: recalled with some effort.
/// - `Easy`: recalled instantly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again,
    Good,
    Easy,
}

impl Rating {
    pub const ALL: [Rating; 3] = [Rating::Again, Rating::Good, Rating::Easy];

    /// Recall quality on the 0–5 scale used by the retention update.
    #[must_use]
    pub fn quality(self) -> u8 {
        match self {
            Rating::Again => 0,
            Rating::Good => 3,
            Rating::Easy => 5,
        }
    }

    /// Whether this rating counts as a failed recall.
    #[must_use]
    pub fn is_lapse(self) -> bool {
        self.quality() < 3
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Good => "good",
            Rating::Easy => "easy",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = RatingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "again" => Ok(Rating::Again),
            "good" => Ok(Rating::Good),
            "easy" => Ok(Rating::Easy),
            _ => Err(RatingError::Unknown(s.to_owned())),
        }
    }
}

//
// ─── SCHEDULED REVIEW ─────────────────────────────────────────────────────────
//

/// Output of the retention update for one rating.
///
/// # Fields
///
/// - `difficulty`: ease factor after the update (never below the minimum ease)
/// - `interval_days`: days until the card is due again
/// - `repetitions`: consecutive successful recalls, reset to 0 on a lapse
/// - `next_due`: `reviewed_at + interval_days`
/// - `state`: learning state after the review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledReview {
    pub rating: Rating,
    pub difficulty: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub next_due: DateTime<Utc>,
    pub state: LearningState,
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_mapping_matches_scale() {
        assert_eq!(Rating::Again.quality(), 0);
        assert_eq!(Rating::Good.quality(), 3);
        assert_eq!(Rating::Easy.quality(), 5);
    }

    #[test]
    fn only_again_is_a_lapse() {
        assert!(Rating::Again.is_lapse());
        assert!(!Rating::Good.is_lapse());
        assert!(!Rating::Easy.is_lapse());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Again".parse::<Rating>().unwrap(), Rating::Again);
        assert_eq!(" good ".parse::<Rating>().unwrap(), Rating::Good);
        assert_eq!("EASY".parse::<Rating>().unwrap(), Rating::Easy);
    }

    #[test]
    fn rejects_unknown_rating() {
        let err = "hard".parse::<Rating>().unwrap_err();
        assert_eq!(err, RatingError::Unknown("hard".into()));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for rating in Rating::ALL {
            assert_eq!(rating.to_string().parse::<Rating>().unwrap(), rating);
        }
    }
}
