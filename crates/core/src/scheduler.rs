use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::{LearningState, Rating, RetentionParams, ScheduledReview, SchedulerSettings};

//
// ─── SCHEDULED STATES ──────────────────────────────────────────────────────────
//

/// Every possible next schedule for a record, one per rating.
///
/// Used to preview intervals before the learner picks a rating; nothing is
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledStates {
    pub again: ScheduledReview,
    pub good: ScheduledReview,
    pub easy: ScheduledReview,
}

impl ScheduledStates {
    #[must_use]
    pub fn select(&self, rating: Rating) -> &ScheduledReview {
        match rating {
            Rating::Again => &self.again,
            Rating::Good => &self.good,
            Rating::Easy => &self.easy,
        }
    }
}

//
// ─── SCHEDULER ─────────────────────────────────────────────────────────────────
//

/// SM-2 style retention updater.
///
/// Each review moves the ease factor by
/// `0.1 − (5 − q) × (0.08 + (5 − q) × 0.02)` where `q` is the rating's recall
/// quality, clamped to the minimum ease. Failed recalls restart the
/// repetition count with a one-day interval; successful recalls graduate
/// through the first and second intervals (1 and 6 days by default) and then
/// grow the previous interval by the new ease, up to the maximum interval.
///
/// # Examples
///
/// ```
/// # use recall_core::scheduler::Scheduler;
/// # use recall_core::model::{LearningState, Rating, RetentionParams};
/// let scheduler = Scheduler::new();
/// let now = chrono::Utc::now();
/// let fresh = RetentionParams::fresh(5.0);
///
/// let next = scheduler.schedule(&fresh, Rating::Good, now);
/// assert_eq!(next.interval_days, 1);
/// assert_eq!(next.state, LearningState::Learning);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    settings: SchedulerSettings,
}

impl Scheduler {
    /// Scheduler with the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_settings(settings: SchedulerSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Ease factor after a review with the given recall quality.
    #[must_use]
    pub fn next_ease(&self, ease: f64, quality: u8) -> f64 {
        let miss = f64::from(5_u8.saturating_sub(quality));
        let updated = ease + (0.1 - miss * (0.08 + miss * 0.02));
        updated.max(self.settings.minimum_ease())
    }

    /// Compute the next schedule for a record rated `rating` at `reviewed_at`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn schedule(
        &self,
        params: &RetentionParams,
        rating: Rating,
        reviewed_at: DateTime<Utc>,
    ) -> ScheduledReview {
        let quality = rating.quality();
        let ease = params.difficulty.unwrap_or(self.settings.fallback_ease());
        let difficulty = self.next_ease(ease, quality);

        let (repetitions, interval_days, state) = if rating.is_lapse() {
            let state = if params.state == LearningState::New {
                LearningState::Learning
            } else {
                LearningState::Relearning
            };
            (0, 1, state)
        } else {
            let repetitions = params.repetitions.saturating_add(1);
            match repetitions {
                1 => (
                    repetitions,
                    self.settings.first_interval_days(),
                    LearningState::Learning,
                ),
                2 => (
                    repetitions,
                    self.settings.second_interval_days(),
                    LearningState::Learning,
                ),
                _ => {
                    let previous = params
                        .stability
                        .unwrap_or_else(|| f64::from(self.settings.second_interval_days()));
                    let grown = (previous * difficulty)
                        .round()
                        .clamp(1.0, f64::from(self.settings.maximum_interval_days()));
                    (repetitions, grown as u32, LearningState::Review)
                }
            }
        };

        ScheduledReview {
            rating,
            difficulty,
            interval_days,
            repetitions,
            next_due: reviewed_at
                .checked_add_signed(Duration::days(i64::from(interval_days)))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            state,
        }
    }

    /// Schedules for every rating, for interval previews.
    #[must_use]
    pub fn preview(&self, params: &RetentionParams, reviewed_at: DateTime<Utc>) -> ScheduledStates {
        ScheduledStates {
            again: self.schedule(params, Rating::Again, reviewed_at),
            good: self.schedule(params, Rating::Good, reviewed_at),
            easy: self.schedule(params, Rating::Easy, reviewed_at),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
