use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use recall_core::model::{DeckId, OwnerId, SessionId};
use recall_core::time::Clock;
use storage::repository::{DeckRepository, FlashcardRepository};

use crate::access::authorize_deck;
use crate::error::SessionError;
use crate::selection::{DueCard, DueCardSelector};

/// Descriptor of a freshly started study session.
///
/// Sessions are not persisted; the id only correlates the reviews a caller
/// submits afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudySession {
    pub session_id: SessionId,
    pub deck_id: DeckId,
    pub deck_name: String,
    pub cards: Vec<DueCard>,
    pub card_count: u32,
    pub started_at: DateTime<Utc>,
}

/// Starts study sessions for an owner's deck.
#[derive(Clone)]
pub struct SessionService {
    clock: Clock,
    default_limit: u32,
    decks: Arc<dyn DeckRepository>,
    flashcards: Arc<dyn FlashcardRepository>,
    selector: DueCardSelector,
}

impl SessionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        default_limit: u32,
        decks: Arc<dyn DeckRepository>,
        flashcards: Arc<dyn FlashcardRepository>,
        selector: DueCardSelector,
    ) -> Self {
        Self {
            clock,
            default_limit,
            decks,
            flashcards,
            selector,
        }
    }

    /// Verify ownership of the deck and collect up to `limit` due cards,
    /// falling back to the configured session limit.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Access` if the deck is missing or owned by
    /// someone else, and `SessionError::Storage` if persistence fails.
    pub async fn initialize_session(
        &self,
        owner_id: OwnerId,
        deck_id: DeckId,
        limit: Option<u32>,
    ) -> Result<StudySession, SessionError> {
        let deck = authorize_deck(self.decks.as_ref(), owner_id, deck_id).await?;
        let now = self.clock.now();
        let limit = limit.unwrap_or(self.default_limit);

        let flashcard_ids = self.flashcards.flashcard_ids(deck_id).await?;
        let cards = self
            .selector
            .select(owner_id, &flashcard_ids, limit, now)
            .await?;

        let card_count = u32::try_from(cards.len()).unwrap_or(u32::MAX);
        log::debug!("session for deck {deck_id} has {card_count} due cards");

        Ok(StudySession {
            session_id: SessionId::generate(),
            deck_id,
            deck_name: deck.name().to_owned(),
            cards,
            card_count,
            started_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::model::{Deck, Flashcard, FlashcardId};
    use recall_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    use crate::error::{AccessError, ErrorKind};

    async fn service_with_deck(cards: u64) -> SessionService {
        let repo = InMemoryRepository::new();
        let deck = Deck::new(DeckId::new(1), OwnerId::new(1), "Verbs", fixed_now()).unwrap();
        repo.upsert_deck(&deck).await.unwrap();
        for id in 1..=cards {
            let card =
                Flashcard::new(FlashcardId::new(id), deck.id(), "front", "back", fixed_now())
                    .unwrap();
            repo.upsert_flashcard(&card).await.unwrap();
        }
        let selector = DueCardSelector::new(5.0, Arc::new(repo.clone()), Arc::new(repo.clone()));
        SessionService::new(
            fixed_clock(),
            20,
            Arc::new(repo.clone()),
            Arc::new(repo),
            selector,
        )
    }

    #[tokio::test]
    async fn session_uses_default_limit() {
        let service = service_with_deck(25).await;
        let session = service
            .initialize_session(OwnerId::new(1), DeckId::new(1), None)
            .await
            .unwrap();
        assert_eq!(session.card_count, 20);
        assert_eq!(session.cards.len(), 20);
        assert_eq!(session.deck_name, "Verbs");
        assert_eq!(session.started_at, fixed_now());
    }

    #[tokio::test]
    async fn explicit_limit_caps_cards() {
        let service = service_with_deck(5).await;
        let session = service
            .initialize_session(OwnerId::new(1), DeckId::new(1), Some(2))
            .await
            .unwrap();
        assert_eq!(session.card_count, 2);
    }

    #[tokio::test]
    async fn sessions_get_distinct_ids() {
        let service = service_with_deck(1).await;
        let a = service
            .initialize_session(OwnerId::new(1), DeckId::new(1), None)
            .await
            .unwrap();
        let b = service
            .initialize_session(OwnerId::new(1), DeckId::new(1), None)
            .await
            .unwrap();
        assert_ne!(a.session_id, b.session_id);
    }

    #[tokio::test]
    async fn foreign_deck_is_forbidden() {
        let service = service_with_deck(1).await;
        let err = service
            .initialize_session(OwnerId::new(2), DeckId::new(1), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Access(AccessError::Forbidden { .. })
        ));
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn empty_deck_starts_empty_session() {
        let service = service_with_deck(0).await;
        let session = service
            .initialize_session(OwnerId::new(1), DeckId::new(1), None)
            .await
            .unwrap();
        assert_eq!(session.card_count, 0);
        assert!(session.cards.is_empty());
    }
}
