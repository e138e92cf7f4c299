use recall_core::model::{Deck, DeckId};

use super::SqliteRepository;
use super::mapping::{map_deck_row, u64_to_i64};
use crate::repository::{DeckRepository, StorageError};

#[async_trait::async_trait]
impl DeckRepository for SqliteRepository {
    async fn upsert_deck(&self, deck: &Deck) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO decks (id, owner_id, name, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                name = excluded.name
            ",
        )
        .bind(u64_to_i64("deck_id", deck.id().value())?)
        .bind(u64_to_i64("owner_id", deck.owner_id().value())?)
        .bind(deck.name().to_owned())
        .bind(deck.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_deck(&self, id: DeckId) -> Result<Option<Deck>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, owner_id, name, created_at
            FROM decks WHERE id = ?1
            ",
        )
        .bind(u64_to_i64("deck_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => map_deck_row(&row).map(Some),
            None => Ok(None),
        }
    }
}
