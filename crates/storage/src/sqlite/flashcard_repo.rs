use recall_core::model::{DeckId, Flashcard, FlashcardId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{id_list, map_flashcard_row, ser, u64_to_i64};
use crate::repository::{FlashcardRepository, StorageError};

#[async_trait::async_trait]
impl FlashcardRepository for SqliteRepository {
    async fn upsert_flashcard(&self, card: &Flashcard) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO flashcards (id, deck_id, front, back, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                -- keep created_at from the original insert
                deck_id = excluded.deck_id,
                front = excluded.front,
                back = excluded.back
            ",
        )
        .bind(u64_to_i64("flashcard_id", card.id().value())?)
        .bind(u64_to_i64("deck_id", card.deck_id().value())?)
        .bind(card.front().to_owned())
        .bind(card.back().to_owned())
        .bind(card.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn flashcard_ids(&self, deck_id: DeckId) -> Result<Vec<FlashcardId>, StorageError> {
        let rows = sqlx::query("SELECT id FROM flashcards WHERE deck_id = ?1 ORDER BY id ASC")
            .bind(u64_to_i64("deck_id", deck_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: i64 = row.try_get("id").map_err(ser)?;
            let id = u64::try_from(raw)
                .map_err(|_| StorageError::Serialization("flashcard_id sign overflow".into()))?;
            ids.push(FlashcardId::new(id));
        }
        Ok(ids)
    }

    async fn get_flashcards(&self, ids: &[FlashcardId]) -> Result<Vec<Flashcard>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = ids
            .iter()
            .map(|id| u64_to_i64("flashcard_id", id.value()))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = sqlx::query(
            r"
            SELECT id, deck_id, front, back, created_at
            FROM flashcards
            WHERE id IN (SELECT value FROM json_each(?1))
            ORDER BY id ASC
            ",
        )
        .bind(id_list(&ids))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut cards = Vec::with_capacity(rows.len());
        for row in rows {
            cards.push(map_flashcard_row(&row)?);
        }
        Ok(cards)
    }
}
