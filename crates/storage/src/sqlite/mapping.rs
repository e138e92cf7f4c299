use chrono::{DateTime, Utc};
use recall_core::model::{
    Deck, DeckId, Flashcard, FlashcardId, LearningState, OwnerId, StudyRecord, StudyRecordId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn count_from_i64(v: i64) -> Result<u32, StorageError> {
    i64_to_u32("count", v)
}

/// Encodes ids as a JSON array bound to a single `json_each(?n)` parameter,
/// so list size is not limited by `SQLite`'s bind-variable cap.
pub(crate) fn id_list(ids: &[i64]) -> String {
    let joined = ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("[{joined}]")
}

/// Scheduling instants are stored as unix milliseconds so SQL compares them
/// numerically at any year.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(field: &'static str, v: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::<Utc>::from_timestamp_millis(v)
        .ok_or_else(|| StorageError::Serialization(format!("{field} out of range: {v}")))
}

pub(crate) fn parse_state(s: &str) -> Result<LearningState, StorageError> {
    s.parse()
        .map_err(|_| StorageError::Serialization(format!("invalid state: {s}")))
}

pub(crate) fn map_deck_row(row: &SqliteRow) -> Result<Deck, StorageError> {
    Deck::new(
        DeckId::new(i64_to_u64("deck_id", row.try_get("id").map_err(ser)?)?),
        OwnerId::new(i64_to_u64("owner_id", row.try_get("owner_id").map_err(ser)?)?),
        row.try_get::<String, _>("name").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_flashcard_row(row: &SqliteRow) -> Result<Flashcard, StorageError> {
    Flashcard::new(
        FlashcardId::new(i64_to_u64("flashcard_id", row.try_get("id").map_err(ser)?)?),
        DeckId::new(i64_to_u64("deck_id", row.try_get("deck_id").map_err(ser)?)?),
        row.try_get::<String, _>("front").map_err(ser)?,
        row.try_get::<String, _>("back").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_record_row(row: &SqliteRow) -> Result<StudyRecord, StorageError> {
    let state_str: String = row.try_get("state").map_err(ser)?;

    Ok(StudyRecord {
        id: StudyRecordId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        owner_id: OwnerId::new(i64_to_u64("owner_id", row.try_get("owner_id").map_err(ser)?)?),
        flashcard_id: FlashcardId::new(i64_to_u64(
            "flashcard_id",
            row.try_get("flashcard_id").map_err(ser)?,
        )?),
        due_date: from_millis("due_date", row.try_get("due_date").map_err(ser)?)?,
        stability: row.try_get("stability").map_err(ser)?,
        repetitions: i64_to_u32("repetitions", row.try_get("repetitions").map_err(ser)?)?,
        difficulty: row.try_get("difficulty").map_err(ser)?,
        lapses: i64_to_u32("lapses", row.try_get("lapses").map_err(ser)?)?,
        state: parse_state(&state_str)?,
        last_review_date: row
            .try_get::<Option<i64>, _>("last_review_date")
            .map_err(ser)?
            .map(|v| from_millis("last_review_date", v))
            .transpose()?,
        version: i64_to_u32("version", row.try_get("version").map_err(ser)?)?,
    })
}
