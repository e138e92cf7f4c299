use chrono::{DateTime, Utc};
use recall_core::model::{FlashcardId, NewStudyRecord, OwnerId, StudyRecord, StudyRecordId};
use recall_core::stats::RetentionCounts;
use sqlx::Row;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

use super::SqliteRepository;
use super::mapping::{
    count_from_i64, from_millis, id_list, map_record_row, ser, to_millis, u64_to_i64,
};
use crate::repository::{StorageError, StudyRecordRepository};

const RECORD_COLUMNS: &str = r"
    id, owner_id, flashcard_id, due_date, stability, repetitions, difficulty,
    lapses, state, last_review_date, version
";

/// Owner plus flashcard set that every scoped query filters on.
///
/// Occupies placeholders `?1` (owner) and `?2` (flashcards as a JSON array);
/// query specific parameters start at [`Scope::NEXT_PARAM`].
struct Scope {
    owner: i64,
    flashcards: Vec<i64>,
}

impl Scope {
    const CLAUSE: &'static str =
        "owner_id = ?1 AND flashcard_id IN (SELECT value FROM json_each(?2))";
    const NEXT_PARAM: usize = 3;

    fn new(owner_id: OwnerId, flashcards: &[FlashcardId]) -> Result<Self, StorageError> {
        let flashcards = flashcards
            .iter()
            .map(|id| u64_to_i64("flashcard_id", id.value()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            owner: u64_to_i64("owner_id", owner_id.value())?,
            flashcards,
        })
    }

    fn is_empty(&self) -> bool {
        self.flashcards.is_empty()
    }

    fn bind<'q>(
        &self,
        q: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        q.bind(self.owner).bind(id_list(&self.flashcards))
    }
}

impl SqliteRepository {
    /// Runs a `SELECT COUNT(*) AS n` over the scope with trailing time bounds.
    async fn scoped_count(
        &self,
        scope: &Scope,
        sql: &str,
        bounds: &[DateTime<Utc>],
    ) -> Result<u32, StorageError> {
        let mut q = scope.bind(sqlx::query(sql));
        for bound in bounds {
            q = q.bind(to_millis(*bound));
        }

        let row = q
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        count_from_i64(row.try_get::<i64, _>("n").map_err(ser)?)
    }
}

#[async_trait::async_trait]
impl StudyRecordRepository for SqliteRepository {
    async fn records_for_flashcards(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
    ) -> Result<Vec<StudyRecord>, StorageError> {
        let scope = Scope::new(owner_id, flashcards)?;
        if scope.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM study_records WHERE {} ORDER BY id ASC",
            Scope::CLAUSE
        );
        let rows = scope
            .bind(sqlx::query(&sql))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(map_record_row(&row)?);
        }
        Ok(records)
    }

    async fn insert_new_records(&self, records: &[NewStudyRecord]) -> Result<u32, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut inserted: u64 = 0;
        for record in records {
            let res = sqlx::query(
                r"
                INSERT INTO study_records (
                    owner_id, flashcard_id, due_date, stability, repetitions, difficulty,
                    lapses, state, last_review_date, version
                )
                VALUES (?1, ?2, ?3, NULL, 0, ?4, 0, 'new', NULL, 0)
                ON CONFLICT(owner_id, flashcard_id) DO NOTHING
                ",
            )
            .bind(u64_to_i64("owner_id", record.owner_id.value())?)
            .bind(u64_to_i64("flashcard_id", record.flashcard_id.value())?)
            .bind(to_millis(record.due_date))
            .bind(record.difficulty)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
            inserted += res.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let inserted = u32::try_from(inserted)
            .map_err(|_| StorageError::Serialization("count overflow".into()))?;
        if (inserted as usize) < records.len() {
            log::debug!(
                "skipped {} study records that already existed",
                records.len() - inserted as usize
            );
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
        let scope = Scope::new(owner_id, flashcards)?;
        if scope.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let now_param = Scope::NEXT_PARAM;
        let sql = format!(
            r"
            SELECT {RECORD_COLUMNS}
            FROM study_records
            WHERE {} AND due_date <= ?{now_param}
            ORDER BY CASE WHEN state = 'new' THEN 0 ELSE 1 END, due_date ASC, id ASC
            LIMIT ?{}
            ",
            Scope::CLAUSE,
            now_param + 1
        );

        let rows = scope
            .bind(sqlx::query(&sql))
            .bind(to_millis(now))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(map_record_row(&row)?);
        }
        Ok(records)
    }

    async fn get_record(
        &self,
        owner_id: OwnerId,
        id: StudyRecordId,
    ) -> Result<Option<StudyRecord>, StorageError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM study_records WHERE id = ?1 AND owner_id = ?2");
        let row = sqlx::query(&sql)
            .bind(u64_to_i64("id", id.value())?)
            .bind(u64_to_i64("owner_id", owner_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => map_record_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn update_review(
        &self,
        record: &StudyRecord,
        expected_version: u32,
    ) -> Result<(), StorageError> {
        let id = u64_to_i64("id", record.id.value())?;
        let owner = u64_to_i64("owner_id", record.owner_id.value())?;

        let res = sqlx::query(
            r"
            UPDATE study_records SET
                due_date = ?1,
                stability = ?2,
                repetitions = ?3,
                difficulty = ?4,
                lapses = ?5,
                state = ?6,
                last_review_date = ?7,
                version = ?8
            WHERE id = ?9 AND owner_id = ?10 AND version = ?11
            ",
        )
        .bind(to_millis(record.due_date))
        .bind(record.stability)
        .bind(i64::from(record.repetitions))
        .bind(record.difficulty)
        .bind(i64::from(record.lapses))
        .bind(record.state.as_str())
        .bind(record.last_review_date.map(to_millis))
        .bind(i64::from(record.version))
        .bind(id)
        .bind(owner)
        .bind(i64::from(expected_version))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 1 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM study_records WHERE id = ?1 AND owner_id = ?2")
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        match exists {
            Some(_) => Err(StorageError::Conflict),
            None => Err(StorageError::NotFound),
        }
    }

    async fn count_due_before(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        until: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let scope = Scope::new(owner_id, flashcards)?;
        if scope.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) AS n FROM study_records WHERE {} AND due_date <= ?{}",
            Scope::CLAUSE,
            Scope::NEXT_PARAM
        );
        self.scoped_count(&scope, &sql, &[until]).await
    }

    async fn count_due_between(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let scope = Scope::new(owner_id, flashcards)?;
        if scope.is_empty() {
            return Ok(0);
        }
        let p = Scope::NEXT_PARAM;
        let sql = format!(
            "SELECT COUNT(*) AS n FROM study_records WHERE {} AND due_date >= ?{p} AND due_date < ?{}",
            Scope::CLAUSE,
            p + 1
        );
        self.scoped_count(&scope, &sql, &[start, end]).await
    }

    async fn count_reviewed_between(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let scope = Scope::new(owner_id, flashcards)?;
        if scope.is_empty() {
            return Ok(0);
        }
        let p = Scope::NEXT_PARAM;
        let sql = format!(
            r"
            SELECT COUNT(*) AS n FROM study_records
            WHERE {} AND last_review_date IS NOT NULL
              AND last_review_date >= ?{p} AND last_review_date < ?{}
            ",
            Scope::CLAUSE,
            p + 1
        );
        self.scoped_count(&scope, &sql, &[start, end]).await
    }

    async fn average_difficulty(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
    ) -> Result<Option<f64>, StorageError> {
        let scope = Scope::new(owner_id, flashcards)?;
        if scope.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT AVG(difficulty) AS avg FROM study_records WHERE {}",
            Scope::CLAUSE
        );
        let row = scope
            .bind(sqlx::query(&sql))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        row.try_get::<Option<f64>, _>("avg").map_err(ser)
    }

    async fn retention_counts(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
    ) -> Result<RetentionCounts, StorageError> {
        let scope = Scope::new(owner_id, flashcards)?;
        if scope.is_empty() {
            return Ok(RetentionCounts::default());
        }
        let sql = format!(
            r"
            SELECT
                COUNT(*) AS reviewed,
                COALESCE(SUM(CASE WHEN lapses = 0 THEN 1 ELSE 0 END), 0) AS without_lapse
            FROM study_records
            WHERE {} AND last_review_date IS NOT NULL
            ",
            Scope::CLAUSE
        );
        let row = scope
            .bind(sqlx::query(&sql))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(RetentionCounts {
            reviewed: count_from_i64(row.try_get("reviewed").map_err(ser)?)?,
            without_lapse: count_from_i64(row.try_get("without_lapse").map_err(ser)?)?,
        })
    }

    async fn review_instants_since(
        &self,
        owner_id: OwnerId,
        flashcards: &[FlashcardId],
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError> {
        let scope = Scope::new(owner_id, flashcards)?;
        if scope.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r"
            SELECT last_review_date FROM study_records
            WHERE {} AND last_review_date IS NOT NULL AND last_review_date >= ?{}
            ",
            Scope::CLAUSE,
            Scope::NEXT_PARAM
        );
        let rows = scope
            .bind(sqlx::query(&sql))
            .bind(to_millis(since))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut instants = Vec::with_capacity(rows.len());
        for row in rows {
            let millis: i64 = row.try_get("last_review_date").map_err(ser)?;
            instants.push(from_millis("last_review_date", millis)?);
        }
        Ok(instants)
    }
}
