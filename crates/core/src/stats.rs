//! Pure aggregation helpers behind per-deck statistics.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::model::DeckId;
use crate::time::DayWindow;

/// Read-only snapshot of a learner's progress in one deck.
///
/// Values are advisory: each one comes from its own query, so they are not
/// guaranteed to describe the same instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeckStatistics {
    pub deck_id: DeckId,
    pub total_cards: u32,
    pub cards_studied_today: u32,
    pub cards_due_today: u32,
    pub cards_due_tomorrow: u32,
    pub average_difficulty: f64,
    pub retention_rate: f64,
    pub streak_days: u32,
}

impl DeckStatistics {
    /// All-zero statistics, used for decks without flashcards.
    #[must_use]
    pub fn empty(deck_id: DeckId) -> Self {
        Self {
            deck_id,
            total_cards: 0,
            cards_studied_today: 0,
            cards_due_today: 0,
            cards_due_tomorrow: 0,
            average_difficulty: 0.0,
            retention_rate: 0.0,
            streak_days: 0,
        }
    }
}

/// Counts of reviewed records, split by whether they ever lapsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionCounts {
    pub reviewed: u32,
    pub without_lapse: u32,
}

impl RetentionCounts {
    /// Fraction of reviewed records that never lapsed; 0 when nothing was reviewed.
    #[must_use]
    pub fn rate(&self) -> f64 {
        if self.reviewed == 0 {
            return 0.0;
        }
        f64::from(self.without_lapse) / f64::from(self.reviewed)
    }
}

/// Number of consecutive calendar days, ending on the day of `now`, with at
/// least one review.
///
/// Walks backwards one day at a time and stops at the first day without a
/// review, or after `lookback_days`. A day without a review today means a
/// streak of 0 regardless of earlier days.
#[must_use]
pub fn streak_days(
    review_instants: &[DateTime<Utc>],
    now: DateTime<Utc>,
    lookback_days: u32,
) -> u32 {
    let reviewed_days: HashSet<NaiveDate> =
        review_instants.iter().map(DateTime::date_naive).collect();

    let today = DayWindow::containing(now);
    let mut streak = 0;
    for offset in 0..lookback_days {
        let day = today.shifted(-i64::from(offset)).start.date_naive();
        if !reviewed_days.contains(&day) {
            break;
        }
        streak += 1;
    }
    streak
}

/// Mean of the given ease factors; 0 when empty.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn streak_is_zero_without_reviews() {
        assert_eq!(streak_days(&[], fixed_now(), 365), 0);
    }

    #[test]
    fn streak_counts_consecutive_days_ending_today() {
        let now = fixed_now();
        let reviews: Vec<_> = (0..4).map(|d| now - Duration::days(d)).collect();
        assert_eq!(streak_days(&reviews, now, 365), 4);
    }

    #[test]
    fn streak_is_zero_when_today_is_missing() {
        let now = fixed_now();
        let reviews = vec![now - Duration::days(1), now - Duration::days(2)];
        assert_eq!(streak_days(&reviews, now, 365), 0);
    }

    #[test]
    fn streak_stops_at_first_gap() {
        let now = fixed_now();
        let reviews = vec![
            now,
            now - Duration::days(1),
            now - Duration::days(3),
            now - Duration::days(4),
        ];
        assert_eq!(streak_days(&reviews, now, 365), 2);
    }

    #[test]
    fn streak_uses_calendar_days_not_24h_spans() {
        // 22:13 today and 00:30 yesterday are more than 24h apart but on consecutive days.
        let now = fixed_now();
        let yesterday_early = DayWindow::containing(now).shifted(-1).start + Duration::minutes(30);
        assert_eq!(streak_days(&[now, yesterday_early], now, 365), 2);
    }

    #[test]
    fn streak_is_bounded_by_lookback() {
        let now = fixed_now();
        let reviews: Vec<_> = (0..10).map(|d| now - Duration::days(d)).collect();
        assert_eq!(streak_days(&reviews, now, 7), 7);
    }

    #[test]
    fn retention_rate_handles_empty_and_partial() {
        assert_eq!(RetentionCounts::default().rate(), 0.0);
        let counts = RetentionCounts {
            reviewed: 4,
            without_lapse: 3,
        };
        assert!((counts.rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert!((mean(&[2.0, 3.0]) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_statistics_are_all_zero() {
        let stats = DeckStatistics::empty(DeckId::new(1));
        assert_eq!(stats.total_cards, 0);
        assert_eq!(stats.streak_days, 0);
        assert_eq!(stats.average_difficulty, 0.0);
        assert_eq!(stats.retention_rate, 0.0);
    }
}
