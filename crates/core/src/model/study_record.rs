use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{FlashcardId, OwnerId, StudyRecordId};
use crate::model::review::ScheduledReview;

//
// ─── LEARNING STATE ────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateError {
    #[error("invalid learning state: {0}")]
    Invalid(String),
}

/// Position of a study record in the learning state machine.
///
/// ```text
/// new ──good/easy──▶ learning ──3rd success──▶ review
///  │                    │  ▲                      │
///  └──again──▶ learning │  └──good/easy── relearning ◀──again──┘
///                       └──again──▶ relearning
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningState {
    New,
    Learning,
    Review,
    Relearning,
}

impl LearningState {
    /// Storage representation, stable across releases.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LearningState::New => "new",
            LearningState::Learning => "learning",
            LearningState::Review => "review",
            LearningState::Relearning => "relearning",
        }
    }
}

impl fmt::Display for LearningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LearningState {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LearningState::New),
            "learning" => Ok(LearningState::Learning),
            "review" => Ok(LearningState::Review),
            "relearning" => Ok(LearningState::Relearning),
            other => Err(StateError::Invalid(other.to_owned())),
        }
    }
}

//
// ─── RETENTION PARAMETERS ──────────────────────────────────────────────────────
//

/// The subset of a record the retention update reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionParams {
    /// Ease factor; `None` falls back to the scheduler's default ease.
    pub difficulty: Option<f64>,
    /// Length in days of the last scheduled interval.
    pub stability: Option<f64>,
    pub repetitions: u32,
    pub state: LearningState,
}

impl RetentionParams {
    /// Parameters of a record that has never been reviewed.
    #[must_use]
    pub fn fresh(initial_ease: f64) -> Self {
        Self {
            difficulty: Some(initial_ease),
            stability: None,
            repetitions: 0,
            state: LearningState::New,
        }
    }
}

//
// ─── STUDY RECORD ──────────────────────────────────────────────────────────────
//

/// Scheduling state of one flashcard for one owner.
///
/// There is exactly one record per `(owner_id, flashcard_id)`. Records are
/// created lazily when a flashcard first enters a study session and are only
/// mutated by applying a review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyRecord {
    pub id: StudyRecordId,
    pub owner_id: OwnerId,
    pub flashcard_id: FlashcardId,
    pub due_date: DateTime<Utc>,
    pub stability: Option<f64>,
    pub repetitions: u32,
    pub difficulty: Option<f64>,
    pub lapses: u32,
    pub state: LearningState,
    pub last_review_date: Option<DateTime<Utc>>,
    /// Bumped on every persisted review; used for conditional updates.
    pub version: u32,
}

impl StudyRecord {
    #[must_use]
    pub fn retention(&self) -> RetentionParams {
        RetentionParams {
            difficulty: self.difficulty,
            stability: self.stability,
            repetitions: self.repetitions,
            state: self.state,
        }
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_date <= now
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        self.state == LearningState::New
    }

    /// Apply a computed schedule to this record.
    ///
    /// The stored interval doubles as `stability`; lapses grow by one only
    /// for a failed recall. The version is bumped so the caller can issue a
    /// conditional write against the previous value.
    pub fn apply_review(&mut self, scheduled: &ScheduledReview, reviewed_at: DateTime<Utc>) {
        self.difficulty = Some(scheduled.difficulty);
        self.stability = Some(f64::from(scheduled.interval_days));
        self.repetitions = scheduled.repetitions;
        self.state = scheduled.state;
        self.due_date = scheduled.next_due;
        self.last_review_date = Some(reviewed_at);
        if scheduled.rating.is_lapse() {
            self.lapses = self.lapses.saturating_add(1);
        }
        self.version = self.version.wrapping_add(1);
    }
}

/// A record that has not been assigned a storage id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStudyRecord {
    pub owner_id: OwnerId,
    pub flashcard_id: FlashcardId,
    pub due_date: DateTime<Utc>,
    pub difficulty: f64,
}

impl NewStudyRecord {
    /// Initial record for a flashcard entering its first session: due now,
    /// state `new`, no stability, zero lapses.
    #[must_use]
    pub fn initial(
        owner_id: OwnerId,
        flashcard_id: FlashcardId,
        now: DateTime<Utc>,
        initial_ease: f64,
    ) -> Self {
        Self {
            owner_id,
            flashcard_id,
            due_date: now,
            difficulty: initial_ease,
        }
    }

    #[must_use]
    pub fn assign_id(self, id: StudyRecordId) -> StudyRecord {
        StudyRecord {
            id,
            owner_id: self.owner_id,
            flashcard_id: self.flashcard_id,
            due_date: self.due_date,
            stability: None,
            repetitions: 0,
            difficulty: Some(self.difficulty),
            lapses: 0,
            state: LearningState::New,
            last_review_date: None,
            version: 0,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rating;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn build_record() -> StudyRecord {
        NewStudyRecord::initial(OwnerId::new(1), FlashcardId::new(2), fixed_now(), 5.0)
            .assign_id(StudyRecordId::new(3))
    }

    fn scheduled(rating: Rating, interval: u32, state: LearningState) -> ScheduledReview {
        ScheduledReview {
            rating,
            difficulty: 2.2,
            interval_days: interval,
            repetitions: 0,
            next_due: fixed_now() + Duration::days(i64::from(interval)),
            state,
        }
    }

    #[test]
    fn state_round_trips_through_storage_string() {
        for state in [
            LearningState::New,
            LearningState::Learning,
            LearningState::Review,
            LearningState::Relearning,
        ] {
            assert_eq!(state.as_str().parse::<LearningState>().unwrap(), state);
        }
        assert!(matches!(
            "reviewing".parse::<LearningState>(),
            Err(StateError::Invalid(_))
        ));
    }

    #[test]
    fn initial_record_follows_lifecycle_defaults() {
        let record = build_record();
        assert_eq!(record.state, LearningState::New);
        assert_eq!(record.due_date, fixed_now());
        assert_eq!(record.difficulty, Some(5.0));
        assert_eq!(record.stability, None);
        assert_eq!(record.lapses, 0);
        assert_eq!(record.version, 0);
        assert!(record.is_due(fixed_now()));
    }

    #[test]
    fn apply_review_counts_lapses_only_for_again() {
        let mut record = build_record();
        record.apply_review(&scheduled(Rating::Good, 1, LearningState::Learning), fixed_now());
        assert_eq!(record.lapses, 0);
        record.apply_review(&scheduled(Rating::Again, 1, LearningState::Relearning), fixed_now());
        assert_eq!(record.lapses, 1);
        record.apply_review(&scheduled(Rating::Easy, 1, LearningState::Learning), fixed_now());
        assert_eq!(record.lapses, 1);
        assert_eq!(record.version, 3);
    }

    #[test]
    fn apply_review_stores_interval_as_stability() {
        let mut record = build_record();
        record.apply_review(&scheduled(Rating::Good, 6, LearningState::Learning), fixed_now());
        assert_eq!(record.stability, Some(6.0));
        assert_eq!(record.last_review_date, Some(fixed_now()));
        assert_eq!(record.due_date, fixed_now() + Duration::days(6));
        assert!(!record.is_due(fixed_now()));
    }
}
