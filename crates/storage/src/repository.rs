use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recall_core::model::{
    Deck, DeckId, Flashcard, FlashcardId, NewStudyRecord, OwnerId, StudyRecord, StudyRecordId,
};
use recall_core::stats::{RetentionCounts, mean};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Repository contract for decks.
#[async_trait]
pub trait DeckRepository: Send + Sync {
    /// Persist or update a deck.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the deck cannot be stored.
    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError>;

    /// Fetch a deck by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, StorageError>;
}

/// Repository contract for flashcards.
#[async_trait]
pub trait FlashcardRepository: Send + Sync {
    /// Persist or update a flashcard.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the flashcard cannot be stored.
    async fn upsert_flashcard(&self, card: &Flashcard) -> Result<(), StorageError>;

    /// IDs of every flashcard in a deck, ascending.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn flashcard_ids(&self, deck_id: DeckId) -> Result<Vec<FlashcardId>, StorageError>;

    /// Fetch flashcards by ID. Unknown IDs are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get_flashcards(&self, ids: &[FlashcardId]) -> Result<Vec<Flashcard>, StorageError>;
}

/// Repository contract for study records.
///
/// Every query is scoped to one owner and, where a flashcard set is given, to
/// records of those flashcards only. An empty flashcard set matches nothing.
#[async_trait]
pub trait StudyRecordRepository: Send + Sync {
    /// Existing records of `owner_id` for the given flashcards.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn records_for_flashcards(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
    ) -> Result<Vec<StudyRecord>, StorageError>;

    /// Insert new records, ignoring any `(owner, flashcard)` pair that already
    /// has one. Returns the number of rows actually inserted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn insert_new_records(&self, records: &[NewStudyRecord]) -> Result<u32, StorageError>;

    /// Records due at `now`, new records first, then by ascending due date.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn due_records(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StudyRecord>, StorageError>;

    /// Fetch a record by ID if it belongs to `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get_record(
        &self,
        owner_id: OwnerId,
        id: StudyRecordId,
    ) -> Result<Option<StudyRecord>, StorageError>;

    /// Write the reviewed fields of `record`, provided the stored version is
    /// still `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record is gone and
    /// `StorageError::Conflict` if another write landed first.
    async fn update_review(
        &self,
        record: &StudyRecord,
        expected_version: u32,
    ) -> Result<(), StorageError>;

    /// Number of records with `due_date <= until`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn count_due_before(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        until: DateTime<Utc>,
    ) -> Result<u32, StorageError>;

    /// Number of records with `start <= due_date < end`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn count_due_between(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StorageError>;

    /// Number of records with `start <= last_review_date < end`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn count_reviewed_between(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StorageError>;

    /// Mean ease over records that carry one; `None` if none do.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn average_difficulty(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
    ) -> Result<Option<f64>, StorageError>;

    /// Reviewed records, and how many of them never lapsed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn retention_counts(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
    ) -> Result<RetentionCounts, StorageError>;

    /// `last_review_date` of every record reviewed at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn review_instants_since(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct RecordTable {
    next_id: u64,
    rows: HashMap<StudyRecordId, StudyRecord>,
    by_pair: HashMap<(OwnerId, FlashcardId), StudyRecordId>,
}

impl RecordTable {
    fn scoped<'a>(
        &'a self,
        owner_id: OwnerId,
        flashcards: &'a [FlashcardId],
    ) -> impl Iterator<Item = &'a StudyRecord> + 'a {
        let wanted: HashSet<FlashcardId> = flashcards.iter().copied().collect();
        self.rows
            .values()
            .filter(move |r| r.owner_id == owner_id && wanted.contains(&r.flashcard_id))
    }
}

fn count_u32(n: usize) -> Result<u32, StorageError> {
    u32::try_from(n).map_err(|_| StorageError::Serialization("count overflow".into()))
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Enforces the same one-record-per-`(owner, flashcard)` rule as the SQL
/// schema, under a single lock so concurrent initializers cannot race.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    decks: Arc<Mutex<HashMap<DeckId, Deck>>>,
    flashcards: Arc<Mutex<HashMap<FlashcardId, Flashcard>>>,
    records: Arc<Mutex<RecordTable>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_records(&self) -> Result<std::sync::MutexGuard<'_, RecordTable>, StorageError> {
        self.records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl DeckRepository for InMemoryRepository {
    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError> {
        let mut guard = self
            .decks
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(deck.id(), deck.clone());
        Ok(())
    }

    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, StorageError> {
        let guard = self
            .decks
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }
}

#[async_trait]
impl FlashcardRepository for InMemoryRepository {
    async fn upsert_flashcard(&self, card: &Flashcard) -> Result<(), StorageError> {
        let mut guard = self
            .flashcards
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(card.id(), card.clone());
        Ok(())
    }

    async fn flashcard_ids(&self, deck_id: DeckId) -> Result<Vec<FlashcardId>, StorageError> {
        let guard = self
            .flashcards
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut ids: Vec<_> = guard
            .values()
            .filter(|c| c.deck_id() == deck_id)
            .map(Flashcard::id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_flashcards(&self, ids: &[FlashcardId]) -> Result<Vec<Flashcard>, StorageError> {
        let guard = self
            .flashcards
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
    }
}

#[async_trait]
impl StudyRecordRepository for InMemoryRepository {
    async fn records_for_flashcards(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
    ) -> Result<Vec<StudyRecord>, StorageError> {
        let guard = self.lock_records()?;
        let mut out: Vec<_> = guard.scoped(owner_id, flashcards).cloned().collect();
        out.sort_by_key(|r| r.id);
        Ok(out)
    }

    async fn insert_new_records(&self, records: &[NewStudyRecord]) -> Result<u32, StorageError> {
        let mut guard = self.lock_records()?;
        let mut inserted = 0;
        for record in records {
            let key = (record.owner_id, record.flashcard_id);
            if guard.by_pair.contains_key(&key) {
                continue;
            }
            guard.next_id += 1;
            let id = StudyRecordId::new(guard.next_id);
            guard.by_pair.insert(key, id);
            guard.rows.insert(id, record.clone().assign_id(id));
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn due_records(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StudyRecord>, StorageError> {
        let guard = self.lock_records()?;
        let mut due: Vec<_> = guard
            .scoped(owner_id, flashcards)
            .filter(|r| r.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|r| (!r.is_new(), r.due_date, r.id));
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(due)
    }

    async fn get_record(
        &self,
        owner_id: OwnerId,
        id: StudyRecordId,
    ) -> Result<Option<StudyRecord>, StorageError> {
        let guard = self.lock_records()?;
        Ok(guard
            .rows
            .get(&id)
            .filter(|r| r.owner_id == owner_id)
            .cloned())
    }

    async fn update_review(
        &self,
        record: &StudyRecord,
        expected_version: u32,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock_records()?;
        let stored = guard
            .rows
            .get_mut(&record.id)
            .filter(|r| r.owner_id == record.owner_id)
            .ok_or(StorageError::NotFound)?;
        if stored.version != expected_version {
            return Err(StorageError::Conflict);
        }
        if stored.flashcard_id != record.flashcard_id {
            return Err(StorageError::Conflict);
        }
        *stored = record.clone();
        Ok(())
    }

    async fn count_due_before(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        until: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let guard = self.lock_records()?;
        count_u32(
            guard
                .scoped(owner_id, flashcards)
                .filter(|r| r.due_date <= until)
                .count(),
        )
    }

    async fn count_due_between(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let guard = self.lock_records()?;
        count_u32(
            guard
                .scoped(owner_id, flashcards)
                .filter(|r| start <= r.due_date && r.due_date < end)
                .count(),
        )
    }

    async fn count_reviewed_between(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let guard = self.lock_records()?;
        count_u32(
            guard
                .scoped(owner_id, flashcards)
                .filter(|r| r.last_review_date.is_some_and(|at| start <= at && at < end))
                .count(),
        )
    }

    async fn average_difficulty(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
    ) -> Result<Option<f64>, StorageError> {
        let guard = self.lock_records()?;
        let eases: Vec<f64> = guard
            .scoped(owner_id, flashcards)
            .filter_map(|r| r.difficulty)
            .collect();
        if eases.is_empty() {
            return Ok(None);
        }
        Ok(Some(mean(&eases)))
    }

    async fn retention_counts(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
    ) -> Result<RetentionCounts, StorageError> {
        let guard = self.lock_records()?;
        let reviewed: Vec<_> = guard
            .scoped(owner_id, flashcards)
            .filter(|r| r.last_review_date.is_some())
            .collect();
        Ok(RetentionCounts {
            reviewed: count_u32(reviewed.len())?,
            without_lapse: count_u32(reviewed.iter().filter(|r| r.lapses == 0).count())?,
        })
    }

    async fn review_instants_since(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError> {
        let guard = self.lock_records()?;
        Ok(guard
            .scoped(owner_id, flashcards)
            .filter_map(|r| r.last_review_date)
            .filter(|at| *at >= since)
            .collect())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub decks: Arc<dyn DeckRepository>,
    pub flashcards: Arc<dyn FlashcardRepository>,
    pub records: Arc<dyn StudyRecordRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let decks: Arc<dyn DeckRepository> = Arc::new(repo.clone());
        let flashcards: Arc<dyn FlashcardRepository> = Arc::new(repo.clone());
        let records: Arc<dyn StudyRecordRepository> = Arc::new(repo);
        Self {
            decks,
            flashcards,
            records,
        }
    }
}
