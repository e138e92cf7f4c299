use thiserror::Error;

use crate::model::{DeckError, RatingError, SettingsError, StateError};

/// Any validation failure raised by the core model.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Rating(#[from] RatingError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Deck(#[from] DeckError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
