use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{DeckId, FlashcardId, OwnerId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeckError {
    #[error("deck name cannot be empty")]
    EmptyName,

    #[error("flashcard front cannot be empty")]
    EmptyFront,

    #[error("flashcard back cannot be empty")]
    EmptyBack,
}

//
// ─── DECK ──────────────────────────────────────────────────────────────────────
//

/// A learner-owned collection of flashcards.
///
/// Decks are managed outside the scheduling engine; here they are only read
/// to check ownership and to label study sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deck {
    id: DeckId,
    owner_id: OwnerId,
    name: String,
    created_at: DateTime<Utc>,
}

impl Deck {
    /// Creates a new Deck.
    ///
    /// # Errors
    ///
    /// Returns `DeckError::EmptyName` if name is empty or whitespace-only.
    pub fn new(
        id: DeckId,
        owner_id: OwnerId,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DeckError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DeckError::EmptyName);
        }

        Ok(Self {
            id,
            owner_id,
            name: name.trim().to_owned(),
            created_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> DeckId {
        self.id
    }

    #[must_use]
    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn is_owned_by(&self, owner_id: OwnerId) -> bool {
        self.owner_id == owner_id
    }
}

//
// ─── FLASHCARD ─────────────────────────────────────────────────────────────────
//

/// Front/back pair belonging to a deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flashcard {
    id: FlashcardId,
    deck_id: DeckId,
    front: String,
    back: String,
    created_at: DateTime<Utc>,
}

impl Flashcard {
    /// Creates a new Flashcard.
    ///
    /// # Errors
    ///
    /// Returns `DeckError::EmptyFront` / `DeckError::EmptyBack` for blank sides.
    pub fn new(
        id: FlashcardId,
        deck_id: DeckId,
        front: impl Into<String>,
        back: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DeckError> {
        let front = front.into();
        let back = back.into();
        if front.trim().is_empty() {
            return Err(DeckError::EmptyFront);
        }
        if back.trim().is_empty() {
            return Err(DeckError::EmptyBack);
        }

        Ok(Self {
            id,
            deck_id,
            front,
            back,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> FlashcardId {
        self.id
    }

    #[must_use]
    pub fn deck_id(&self) -> DeckId {
        self.deck_id
    }

    #[must_use]
    pub fn front(&self) -> &str {
        &self.front
    }

    #[must_use]
    pub fn back(&self) -> &str {
        &self.back
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
