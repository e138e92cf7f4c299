#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    DeckRepository, FlashcardRepository, InMemoryRepository, Storage, StorageError,
    StudyRecordRepository,
};
