use std::sync::Arc;

use recall_core::model::{
    DeckId, FlashcardId, OwnerId, Rating, SchedulerSettings, StudyRecordId,
};
use recall_core::scheduler::{ScheduledStates, Scheduler};
use recall_core::stats::DeckStatistics;
use storage::repository::Storage;

use crate::Clock;
use crate::error::{EngineError, ReviewServiceError, SessionError, StatsError};
use crate::review_service::{ReviewSchedule, ReviewService};
use crate::selection::DueCardSelector;
use crate::session_service::{SessionService, StudySession};
use crate::stats_service::StatsService;

/// Assembles the scheduling services over one storage backend.
#[derive(Clone)]
pub struct SchedulingEngine {
    settings: SchedulerSettings,
    sessions: Arc<SessionService>,
    reviews: Arc<ReviewService>,
    stats: Arc<StatsService>,
}

impl SchedulingEngine {
    /// Build the engine over already-initialized storage.
    #[must_use]
    pub fn new(storage: &Storage, clock: Clock, settings: SchedulerSettings) -> Self {
        let selector = DueCardSelector::new(
            settings.initial_ease(),
            Arc::clone(&storage.flashcards),
            Arc::clone(&storage.records),
        );
        let sessions = Arc::new(SessionService::new(
            clock,
            settings.session_limit(),
            Arc::clone(&storage.decks),
            Arc::clone(&storage.flashcards),
            selector,
        ));
        let reviews = Arc::new(
            ReviewService::new(Arc::clone(&storage.records))
                .with_scheduler(Scheduler::with_settings(settings.clone()))
                .with_clock(clock),
        );
        let stats = Arc::new(StatsService::new(
            clock,
            settings.streak_lookback_days(),
            Arc::clone(&storage.decks),
            Arc::clone(&storage.flashcards),
            Arc::clone(&storage.records),
        ));

        Self {
            settings,
            sessions,
            reviews,
            stats,
        }
    }

    /// Build the engine backed by `SQLite`, running migrations first.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: SchedulerSettings,
    ) -> Result<Self, EngineError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(&storage, clock, settings))
    }

    #[must_use]
    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionService> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn reviews(&self) -> Arc<ReviewService> {
        Arc::clone(&self.reviews)
    }

    #[must_use]
    pub fn stats(&self) -> Arc<StatsService> {
        Arc::clone(&self.stats)
    }

    /// See [`SessionService::initialize_session`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError` on authorization or persistence failures.
    pub async fn initialize_session(
        &self,
        owner_id: OwnerId,
        deck_id: DeckId,
        limit: Option<u32>,
    ) -> Result<StudySession, SessionError> {
        self.sessions
            .initialize_session(owner_id, deck_id, limit)
            .await
    }

    /// See [`ReviewService::process_review`].
    ///
    /// # Errors
    ///
    /// Returns `ReviewServiceError` for missing records, flashcard mismatches,
    /// concurrent updates, or persistence failures.
    pub async fn process_review(
        &self,
        owner_id: OwnerId,
        record_id: StudyRecordId,
        flashcard_id: FlashcardId,
        rating: Rating,
    ) -> Result<ReviewSchedule, ReviewServiceError> {
        self.reviews
            .process_review(owner_id, record_id, flashcard_id, rating)
            .await
    }

    /// See [`ReviewService::preview`].
    ///
    /// # Errors
    ///
    /// Returns `ReviewServiceError` for missing records or persistence failures.
    pub async fn preview_review(
        &self,
        owner_id: OwnerId,
        record_id: StudyRecordId,
    ) -> Result<ScheduledStates, ReviewServiceError> {
        self.reviews.preview(owner_id, record_id).await
    }

    /// See [`StatsService::deck_statistics`].
    ///
    /// # Errors
    ///
    /// Returns `StatsError` on authorization or persistence failures.
    pub async fn deck_statistics(
        &self,
        owner_id: OwnerId,
        deck_id: DeckId,
    ) -> Result<DeckStatistics, StatsError> {
        self.stats.deck_statistics(owner_id, deck_id).await
    }
}
