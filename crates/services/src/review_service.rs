use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use recall_core::{
    model::{
        FlashcardId, LearningState, OwnerId, Rating, ScheduledReview, StudyRecord, StudyRecordId,
    },
    scheduler::{ScheduledStates, Scheduler},
    time::Clock,
};
use storage::repository::{StorageError, StudyRecordRepository};

use crate::error::ReviewServiceError;

//
// ─── REVIEW SCHEDULE ───────────────────────────────────────────────────────────
//

/// Outcome of a processed review, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSchedule {
    pub study_record_id: StudyRecordId,
    pub flashcard_id: FlashcardId,
    pub rating: Rating,
    pub difficulty: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub lapses: u32,
    pub state: LearningState,
    pub next_due: DateTime<Utc>,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewSchedule {
    fn new(record: &StudyRecord, scheduled: &ScheduledReview, reviewed_at: DateTime<Utc>) -> Self {
        Self {
            study_record_id: record.id,
            flashcard_id: record.flashcard_id,
            rating: scheduled.rating,
            difficulty: scheduled.difficulty,
            interval_days: scheduled.interval_days,
            repetitions: scheduled.repetitions,
            lapses: record.lapses,
            state: scheduled.state,
            next_due: scheduled.next_due,
            reviewed_at,
        }
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Applies a learner's rating to a study record and persists the new schedule.
#[derive(Clone)]
pub struct ReviewService {
    clock: Clock,
    scheduler: Scheduler,
    records: Arc<dyn StudyRecordRepository>,
}

impl ReviewService {
    /// Review service with the default scheduler and a real-time clock.
    #[must_use]
    pub fn new(records: Arc<dyn StudyRecordRepository>) -> Self {
        Self {
            clock: Clock::default(),
            scheduler: Scheduler::new(),
            records,
        }
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the service's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn load(
        &self,
        owner_id: OwnerId,
        record_id: StudyRecordId,
    ) -> Result<StudyRecord, ReviewServiceError> {
        self.records
            .get_record(owner_id, record_id)
            .await?
            .ok_or(ReviewServiceError::RecordNotFound(record_id))
    }

    /// Rate the flashcard behind `record_id` and persist the resulting
    /// schedule.
    ///
    /// The write only lands if nobody else updated the record since it was
    /// read. Submitting the same review twice schedules it twice.
    ///
    /// # Errors
    ///
    /// - `RecordNotFound` if the record is absent or belongs to another owner.
    /// - `IntegrityViolation` if `flashcard_id` is not the record's flashcard.
    /// - `Conflict` if a concurrent review updated the record first.
    /// - `Storage` if persistence fails.
    pub async fn process_review(
        &self,
        owner_id: OwnerId,
        record_id: StudyRecordId,
        flashcard_id: FlashcardId,
        rating: Rating,
    ) -> Result<ReviewSchedule, ReviewServiceError> {
        let mut record = self.load(owner_id, record_id).await?;

        if record.flashcard_id != flashcard_id {
            log::warn!(
                "study record {record_id} references flashcard {}, review named {flashcard_id}",
                record.flashcard_id
            );
            return Err(ReviewServiceError::IntegrityViolation {
                record_id,
                stored: record.flashcard_id,
                submitted: flashcard_id,
            });
        }

        let reviewed_at = self.now();
        let expected_version = record.version;
        let scheduled = self
            .scheduler
            .schedule(&record.retention(), rating, reviewed_at);
        record.apply_review(&scheduled, reviewed_at);

        match self.records.update_review(&record, expected_version).await {
            Ok(()) => Ok(ReviewSchedule::new(&record, &scheduled, reviewed_at)),
            Err(StorageError::Conflict) => {
                log::warn!("study record {record_id} changed while being reviewed");
                Err(ReviewServiceError::Conflict(record_id))
            }
            Err(StorageError::NotFound) => Err(ReviewServiceError::RecordNotFound(record_id)),
            Err(err) => Err(err.into()),
        }
    }

    /// The schedule each rating would produce right now, without persisting.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if the record is absent or belongs to another
    /// owner, and `Storage` if the read fails.
    pub async fn preview(
        &self,
        owner_id: OwnerId,
        record_id: StudyRecordId,
    ) -> Result<ScheduledStates, ReviewServiceError> {
        let record = self.load(owner_id, record_id).await?;
        Ok(self.scheduler.preview(&record.retention(), self.now()))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use recall_core::{
        model::NewStudyRecord,
        time::{fixed_clock, fixed_now},
    };
    use storage::repository::InMemoryRepository;

    use crate::error::ErrorKind;

    async fn repo_with_record() -> (InMemoryRepository, StudyRecord) {
        let repo = InMemoryRepository::new();
        repo.insert_new_records(&[NewStudyRecord::initial(
            OwnerId::new(1),
            FlashcardId::new(10),
            fixed_now(),
            5.0,
        )])
        .await
        .unwrap();
        let record = repo
            .records_for_flashcards(OwnerId::new(1), &[FlashcardId::new(10)])
            .await
            .unwrap()
            .remove(0);
        (repo, record)
    }

    fn service(repo: &InMemoryRepository) -> ReviewService {
        ReviewService::new(Arc::new(repo.clone())).with_clock(fixed_clock())
    }

    #[tokio::test]
    async fn good_review_on_new_record_enters_learning() {
        let (repo, record) = repo_with_record().await;
        let result = service(&repo)
            .process_review(OwnerId::new(1), record.id, FlashcardId::new(10), Rating::Good)
            .await
            .unwrap();

        assert_eq!(result.interval_days, 1);
        assert_eq!(result.repetitions, 1);
        assert_eq!(result.state, LearningState::Learning);
        assert_eq!(result.next_due, fixed_now() + Duration::days(1));
        assert_eq!(result.reviewed_at, fixed_now());
        assert!((result.difficulty - 4.86).abs() < 1e-9);

        let stored = repo
            .get_record(OwnerId::new(1), record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.stability, Some(1.0));
        assert_eq!(stored.last_review_date, Some(fixed_now()));
    }

    #[tokio::test]
    async fn again_increments_lapses() {
        let (repo, record) = repo_with_record().await;
        let result = service(&repo)
            .process_review(OwnerId::new(1), record.id, FlashcardId::new(10), Rating::Again)
            .await
            .unwrap();
        assert_eq!(result.lapses, 1);
        assert_eq!(result.repetitions, 0);
        assert_eq!(result.interval_days, 1);
    }

    #[tokio::test]
    async fn mismatched_flashcard_is_integrity_violation() {
        let (repo, record) = repo_with_record().await;
        let err = service(&repo)
            .process_review(OwnerId::new(1), record.id, FlashcardId::new(11), Rating::Good)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntegrityViolation);

        let stored = repo
            .get_record(OwnerId::new(1), record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn other_owner_cannot_review() {
        let (repo, record) = repo_with_record().await;
        let err = service(&repo)
            .process_review(OwnerId::new(2), record.id, FlashcardId::new(10), Rating::Good)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewServiceError::RecordNotFound(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn resubmission_is_processed_again() {
        let (repo, record) = repo_with_record().await;
        let service = service(&repo);
        let first = service
            .process_review(OwnerId::new(1), record.id, FlashcardId::new(10), Rating::Good)
            .await
            .unwrap();
        let second = service
            .process_review(OwnerId::new(1), record.id, FlashcardId::new(10), Rating::Good)
            .await
            .unwrap();
        assert_eq!(first.repetitions, 1);
        assert_eq!(second.repetitions, 2);
        assert_eq!(second.interval_days, 6);
    }

    #[tokio::test]
    async fn repeated_easy_reviews_stay_within_the_maximum_interval() {
        let (repo, record) = repo_with_record().await;
        let service = service(&repo);
        let mut last = None;
        for _ in 0..40 {
            let result = service
                .process_review(OwnerId::new(1), record.id, FlashcardId::new(10), Rating::Easy)
                .await
                .unwrap();
            assert!(result.interval_days <= 36_500);
            last = Some(result);
        }

        let last = last.unwrap();
        assert_eq!(last.interval_days, 36_500);
        assert_eq!(last.next_due, fixed_now() + Duration::days(36_500));

        let stored = repo
            .get_record(OwnerId::new(1), record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.version, 40);
        assert_eq!(stored.repetitions, 40);
    }

    #[tokio::test]
    async fn preview_does_not_persist() {
        let (repo, record) = repo_with_record().await;
        let states = service(&repo)
            .preview(OwnerId::new(1), record.id)
            .await
            .unwrap();
        assert_eq!(states.good.interval_days, 1);
        assert_eq!(states.again.repetitions, 0);

        let stored = repo
            .get_record(OwnerId::new(1), record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.version, 0);
    }
}
