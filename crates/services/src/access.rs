use recall_core::model::{Deck, DeckId, OwnerId};
use storage::repository::DeckRepository;

use crate::error::AccessError;

/// Load a deck and confirm it belongs to `owner_id`.
///
/// # Errors
///
/// Returns `AccessError::DeckNotFound` if the deck does not exist,
/// `AccessError::Forbidden` if another owner holds it, and
/// `AccessError::Storage` if the lookup fails.
pub async fn authorize_deck(
    decks: &dyn DeckRepository,
    owner_id: OwnerId,
    deck_id: DeckId,
) -> Result<Deck, AccessError> {
    let deck = decks
        .get_deck(deck_id)
        .await?
        .ok_or(AccessError::DeckNotFound(deck_id))?;

    if !deck.is_owned_by(owner_id) {
        return Err(AccessError::Forbidden { deck_id, owner_id });
    }
    Ok(deck)
}
