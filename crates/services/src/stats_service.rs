use std::sync::Arc;

use recall_core::model::{DeckId, OwnerId};
use recall_core::stats::{DeckStatistics, streak_days};
use recall_core::time::{Clock, DayWindow};
use storage::repository::{DeckRepository, FlashcardRepository, StudyRecordRepository};

use crate::access::authorize_deck;
use crate::error::StatsError;

/// Computes per-deck progress statistics for an owner.
#[derive(Clone)]
pub struct StatsService {
    clock: Clock,
    streak_lookback_days: u32,
    decks: Arc<dyn DeckRepository>,
    flashcards: Arc<dyn FlashcardRepository>,
    records: Arc<dyn StudyRecordRepository>,
}

impl StatsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        streak_lookback_days: u32,
        decks: Arc<dyn DeckRepository>,
        flashcards: Arc<dyn FlashcardRepository>,
        records: Arc<dyn StudyRecordRepository>,
    ) -> Self {
        Self {
            clock,
            streak_lookback_days,
            decks,
            flashcards,
            records,
        }
    }

    /// Statistics for `deck_id` as seen by `owner_id`.
    ///
    /// The record queries run concurrently, so the figures are not a single
    /// consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StatsError::Access` if the deck is missing or owned by someone
    /// else, and `StatsError::Storage` if any query fails.
    pub async fn deck_statistics(
        &self,
        owner_id: OwnerId,
        deck_id: DeckId,
    ) -> Result<DeckStatistics, StatsError> {
        authorize_deck(self.decks.as_ref(), owner_id, deck_id).await?;
        let now = self.clock.now();

        let flashcards = self.flashcards.flashcard_ids(deck_id).await?;
        if flashcards.is_empty() {
            return Ok(DeckStatistics::empty(deck_id));
        }

        let today = DayWindow::containing(now);
        let tomorrow = DayWindow::following(now);
        let lookback_start = today
            .shifted(1 - i64::from(self.streak_lookback_days))
            .start;

        let records = self.records.as_ref();
        let (studied_today, due_today, due_tomorrow, average, retention, instants) = tokio::try_join!(
            records.count_reviewed_between(owner_id, &flashcards, today.start, today.end),
            records.count_due_before(owner_id, &flashcards, now),
            records.count_due_between(owner_id, &flashcards, tomorrow.start, tomorrow.end),
            records.average_difficulty(owner_id, &flashcards),
            records.retention_counts(owner_id, &flashcards),
            records.review_instants_since(owner_id, &flashcards, lookback_start),
        )?;

        let stats = DeckStatistics {
            deck_id,
            total_cards: u32::try_from(flashcards.len()).unwrap_or(u32::MAX),
            cards_studied_today: studied_today,
            cards_due_today: due_today,
            cards_due_tomorrow: due_tomorrow,
            average_difficulty: average.unwrap_or(0.0),
            retention_rate: retention.rate(),
            streak_days: streak_days(&instants, now, self.streak_lookback_days),
        };
        log::debug!("computed statistics for deck {deck_id}: {stats:?}");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use recall_core::model::{Deck, Flashcard, FlashcardId, Rating};
    use recall_core::scheduler::Scheduler;
    use recall_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    use crate::error::ErrorKind;
    use crate::selection::DueCardSelector;

    async fn deck_with_cards(repo: &InMemoryRepository, cards: u64) -> Vec<FlashcardId> {
        let deck = Deck::new(DeckId::new(1), OwnerId::new(1), "Deck", fixed_now()).unwrap();
        repo.upsert_deck(&deck).await.unwrap();
        let mut ids = Vec::new();
        for id in 1..=cards {
            let card =
                Flashcard::new(FlashcardId::new(id), deck.id(), "front", "back", fixed_now())
                    .unwrap();
            repo.upsert_flashcard(&card).await.unwrap();
            ids.push(card.id());
        }
        ids
    }

    fn service(repo: &InMemoryRepository) -> StatsService {
        StatsService::new(
            fixed_clock(),
            365,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    #[tokio::test]
    async fn empty_deck_yields_zero_statistics() {
        let repo = InMemoryRepository::new();
        deck_with_cards(&repo, 0).await;
        let stats = service(&repo)
            .deck_statistics(OwnerId::new(1), DeckId::new(1))
            .await
            .unwrap();
        assert_eq!(stats, DeckStatistics::empty(DeckId::new(1)));
    }

    #[tokio::test]
    async fn statistics_reflect_reviews_and_due_dates() {
        let repo = InMemoryRepository::new();
        let ids = deck_with_cards(&repo, 3).await;
        let owner = OwnerId::new(1);
        let now = fixed_now();
        let selector = DueCardSelector::new(5.0, Arc::new(repo.clone()), Arc::new(repo.clone()));
        selector.initialize_missing(owner, &ids, now).await.unwrap();

        // Review card 1 yesterday and today; card 2 lapses today.
        let scheduler = Scheduler::new();
        let records = repo.records_for_flashcards(owner, &ids).await.unwrap();
        let mut first = records[0].clone();
        let yesterday = now - Duration::days(1);
        first.apply_review(
            &scheduler.schedule(&first.retention(), Rating::Good, yesterday),
            yesterday,
        );
        first.apply_review(
            &scheduler.schedule(&first.retention(), Rating::Good, now),
            now,
        );
        repo.update_review(&first, 0).await.unwrap();

        let mut second = records[1].clone();
        second.apply_review(
            &scheduler.schedule(&second.retention(), Rating::Again, now),
            now,
        );
        repo.update_review(&second, 0).await.unwrap();

        let stats = service(&repo).deck_statistics(owner, DeckId::new(1)).await.unwrap();
        assert_eq!(stats.total_cards, 3);
        assert_eq!(stats.cards_studied_today, 2);
        assert_eq!(stats.cards_due_today, 1);
        assert_eq!(stats.cards_due_tomorrow, 1);
        assert!((stats.retention_rate - 0.5).abs() < 1e-9);
        // Only the latest review of each record is kept, so yesterday is lost.
        assert_eq!(stats.streak_days, 1);
        assert!(stats.average_difficulty > 1.3);
    }

    #[tokio::test]
    async fn statistics_require_ownership() {
        let repo = InMemoryRepository::new();
        deck_with_cards(&repo, 1).await;
        let err = service(&repo)
            .deck_statistics(OwnerId::new(2), DeckId::new(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = service(&repo)
            .deck_statistics(OwnerId::new(1), DeckId::new(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
