use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use recall_core::model::{
    Flashcard, FlashcardId, LearningState, NewStudyRecord, OwnerId, StudyRecord, StudyRecordId,
};
use storage::repository::{FlashcardRepository, StorageError, StudyRecordRepository};

/// A due study record joined with its flashcard content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueCard {
    pub study_record_id: StudyRecordId,
    pub flashcard_id: FlashcardId,
    pub front: String,
    pub back: String,
    pub state: LearningState,
    pub due_date: DateTime<Utc>,
}

impl DueCard {
    fn from_parts(record: &StudyRecord, card: &Flashcard) -> Self {
        Self {
            study_record_id: record.id,
            flashcard_id: record.flashcard_id,
            front: card.front().to_owned(),
            back: card.back().to_owned(),
            state: record.state,
            due_date: record.due_date,
        }
    }
}

/// Picks the records due for review in a set of flashcards, creating records
/// for flashcards the owner has never studied.
#[derive(Clone)]
pub struct DueCardSelector {
    initial_ease: f64,
    flashcards: Arc<dyn FlashcardRepository>,
    records: Arc<dyn StudyRecordRepository>,
}

impl DueCardSelector {
    #[must_use]
    pub fn new(
        initial_ease: f64,
        flashcards: Arc<dyn FlashcardRepository>,
        records: Arc<dyn StudyRecordRepository>,
    ) -> Self {
        Self {
            initial_ease,
            flashcards,
            records,
        }
    }

    /// Create a `new` record, due at `now`, for every flashcard in `flashcards`
    /// that `owner_id` has no record for yet. Returns how many were created.
    ///
    /// Safe to run concurrently for the same owner: a record created by a
    /// racing call is treated as already initialized.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the records cannot be read or written.
    pub async fn initialize_missing(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        now: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        if flashcards.is_empty() {
            return Ok(0);
        }

        let existing = self
            .records
            .records_for_flashcards(owner_id, flashcards)
            .await?;
        let known: HashSet<FlashcardId> = existing.iter().map(|r| r.flashcard_id).collect();

        let missing: Vec<NewStudyRecord> = flashcards
            .iter()
            .filter(|id| !known.contains(id))
            .map(|id| NewStudyRecord::initial(owner_id, *id, now, self.initial_ease))
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let inserted = self.records.insert_new_records(&missing).await?;
        log::info!("initialized {inserted} study records for owner {owner_id}");
        Ok(inserted)
    }

    /// Up to `limit` due cards, new records first, then oldest due date.
    ///
    /// The limit is applied to due records before their flashcards are
    /// loaded. A flashcard deleted in between is dropped without being
    /// replaced, so the result can be shorter than `limit` even when more
    /// cards are due.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if initialization or any read fails.
    pub async fn select(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueCard>, StorageError> {
        self.initialize_missing(owner_id, flashcards, now).await?;
        if limit == 0 || flashcards.is_empty() {
            return Ok(Vec::new());
        }

        let due = self
            .records
            .due_records(owner_id, flashcards, now, limit)
            .await?;
        let ids: Vec<FlashcardId> = due.iter().map(|r| r.flashcard_id).collect();
        let cards: HashMap<FlashcardId, Flashcard> = self
            .flashcards
            .get_flashcards(&ids)
            .await?
            .into_iter()
            .map(|card| (card.id(), card))
            .collect();

        let selected: Vec<DueCard> = due
            .iter()
            .filter_map(|record| {
                cards
                    .get(&record.flashcard_id)
                    .map(|card| DueCard::from_parts(record, card))
            })
            .collect();

        log::debug!(
            "selected {} of {} due records for owner {owner_id}",
            selected.len(),
            due.len()
        );
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use recall_core::model::{Deck, DeckId};
    use recall_core::time::fixed_now;
    use storage::repository::{DeckRepository, InMemoryRepository};

    async fn seeded(cards: u64) -> (InMemoryRepository, Vec<FlashcardId>) {
        let repo = InMemoryRepository::new();
        let deck = Deck::new(DeckId::new(1), OwnerId::new(1), "Deck", fixed_now()).unwrap();
        repo.upsert_deck(&deck).await.unwrap();
        let mut ids = Vec::new();
        for id in 1..=cards {
            let card = Flashcard::new(
                FlashcardId::new(id),
                deck.id(),
                format!("front {id}"),
                format!("back {id}"),
                fixed_now(),
            )
            .unwrap();
            repo.upsert_flashcard(&card).await.unwrap();
            ids.push(card.id());
        }
        (repo, ids)
    }

    fn selector(repo: &InMemoryRepository) -> DueCardSelector {
        DueCardSelector::new(5.0, Arc::new(repo.clone()), Arc::new(repo.clone()))
    }

    #[tokio::test]
    async fn first_selection_initializes_every_flashcard() {
        let (repo, ids) = seeded(3).await;
        let selected = selector(&repo)
            .select(OwnerId::new(1), &ids, 10, fixed_now())
            .await
            .unwrap();

        assert_eq!(selected.len(), 3);
        assert!(selected.iter().all(|c| c.state == LearningState::New));
        assert!(selected.iter().all(|c| c.due_date == fixed_now()));
        assert_eq!(selected[0].front, "front 1");
    }

    #[tokio::test]
    async fn zero_limit_initializes_but_returns_nothing() {
        let (repo, ids) = seeded(2).await;
        let selected = selector(&repo)
            .select(OwnerId::new(1), &ids, 0, fixed_now())
            .await
            .unwrap();
        assert!(selected.is_empty());

        let records = repo
            .records_for_flashcards(OwnerId::new(1), &ids)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn repeated_initialization_creates_nothing_new() {
        let (repo, ids) = seeded(2).await;
        let selector = selector(&repo);
        let owner = OwnerId::new(1);
        assert_eq!(
            selector.initialize_missing(owner, &ids, fixed_now()).await.unwrap(),
            2
        );
        assert_eq!(
            selector
                .initialize_missing(owner, &ids, fixed_now() + Duration::hours(1))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn future_records_are_not_selected() {
        let (repo, ids) = seeded(1).await;
        let selector = selector(&repo);
        let owner = OwnerId::new(1);
        let later = fixed_now() + Duration::days(1);
        selector.initialize_missing(owner, &ids, later).await.unwrap();

        let selected = selector.select(owner, &ids, 10, fixed_now()).await.unwrap();
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn records_without_flashcards_shorten_the_selection() {
        let (repo, ids) = seeded(3).await;
        let owner = OwnerId::new(1);
        let mut with_missing = vec![FlashcardId::new(99)];
        with_missing.extend(ids);

        let selected = selector(&repo)
            .select(owner, &with_missing, 2, fixed_now())
            .await
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].flashcard_id, FlashcardId::new(1));

        let due = repo
            .count_due_before(owner, &with_missing, fixed_now())
            .await
            .unwrap();
        assert_eq!(due, 4);
    }
}
