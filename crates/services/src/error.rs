//! Shared error types for the services crate.

use serde::Serialize;
use thiserror::Error;

use recall_core::model::{DeckId, FlashcardId, OwnerId, StudyRecordId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse classification of service failures, for mapping at a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    IntegrityViolation,
    Conflict,
    Unavailable,
}

impl ErrorKind {
    /// Suggested HTTP status for a transport layer.
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::Conflict => 409,
            ErrorKind::IntegrityViolation | ErrorKind::Unavailable => 500,
        }
    }
}

fn storage_kind(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::NotFound => ErrorKind::NotFound,
        StorageError::Conflict => ErrorKind::Conflict,
        _ => ErrorKind::Unavailable,
    }
}

/// Errors emitted by the deck authorization check.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccessError {
    #[error("deck {0} not found")]
    DeckNotFound(DeckId),
    #[error("deck {deck_id} does not belong to owner {owner_id}")]
    Forbidden { deck_id: DeckId, owner_id: OwnerId },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AccessError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::DeckNotFound(_) => ErrorKind::NotFound,
            AccessError::Forbidden { .. } => ErrorKind::Forbidden,
            AccessError::Storage(err) => storage_kind(err),
        }
    }
}

/// Errors emitted by `SessionService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Access(err) => err.kind(),
            SessionError::Storage(_) => ErrorKind::Unavailable,
        }
    }
}

/// Errors emitted by `ReviewService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReviewServiceError {
    #[error("study record {0} not found")]
    RecordNotFound(StudyRecordId),
    #[error(
        "study record {record_id} references flashcard {stored}, review named flashcard {submitted}"
    )]
    IntegrityViolation {
        record_id: StudyRecordId,
        stored: FlashcardId,
        submitted: FlashcardId,
    },
    #[error("study record {0} was modified concurrently")]
    Conflict(StudyRecordId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ReviewServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReviewServiceError::RecordNotFound(_) => ErrorKind::NotFound,
            ReviewServiceError::IntegrityViolation { .. } => ErrorKind::IntegrityViolation,
            ReviewServiceError::Conflict(_) => ErrorKind::Conflict,
            ReviewServiceError::Storage(_) => ErrorKind::Unavailable,
        }
    }
}

/// Errors emitted by `StatsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatsError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StatsError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            StatsError::Access(err) => err.kind(),
            StatsError::Storage(_) => ErrorKind::Unavailable,
        }
    }
}

/// Errors emitted while bootstrapping the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_status_codes() {
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::Forbidden.status_code(), 403);
        assert_eq!(ErrorKind::IntegrityViolation.status_code(), 500);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::Unavailable.status_code(), 500);
    }

    #[test]
    fn storage_failures_are_unavailable() {
        let err = SessionError::from(StorageError::Connection("down".into()));
        assert_eq!(err.kind(), ErrorKind::Unavailable);

        let err = StatsError::from(AccessError::from(StorageError::Connection("down".into())));
        assert_eq!(err.kind(), ErrorKind::Unavailable);

        let err = ReviewServiceError::from(StorageError::Serialization("bad row".into()));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn access_errors_keep_their_kind_when_wrapped() {
        let forbidden = AccessError::Forbidden {
            deck_id: DeckId::new(1),
            owner_id: OwnerId::new(2),
        };
        assert_eq!(SessionError::from(forbidden).kind(), ErrorKind::Forbidden);
        let missing = AccessError::DeckNotFound(DeckId::new(3));
        assert_eq!(StatsError::from(missing).kind(), ErrorKind::NotFound);
    }
}
