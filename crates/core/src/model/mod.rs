mod deck;
mod ids;
mod review;
mod settings;
mod study_record;

pub use ids::{DeckId, FlashcardId, OwnerId, ParseIdError, SessionId, StudyRecordId};

pub use deck::{Deck, DeckError, Flashcard};
pub use review::{Rating, RatingError, ScheduledReview};
pub use settings::{SchedulerSettings, SettingsError};
pub use study_record::{LearningState, NewStudyRecord, RetentionParams, StateError, StudyRecord};
