use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Applies pending schema versions in order, one transaction per version.
///
/// Version 1 creates decks, flashcards and study records. A study record is
/// unique per `(owner_id, flashcard_id)`, which is what makes concurrent
/// session initialization safe. Its due and review instants are unix
/// milliseconds so range filters and ordering compare numerically.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS decks (
                    id INTEGER PRIMARY KEY,
                    owner_id INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS flashcards (
                    id INTEGER PRIMARY KEY,
                    deck_id INTEGER NOT NULL,
                    front TEXT NOT NULL,
                    back TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS study_records (
                    id INTEGER PRIMARY KEY,
                    owner_id INTEGER NOT NULL,
                    flashcard_id INTEGER NOT NULL,
                    due_date INTEGER NOT NULL,
                    stability REAL CHECK (stability IS NULL OR stability >= 0),
                    repetitions INTEGER NOT NULL DEFAULT 0 CHECK (repetitions >= 0),
                    difficulty REAL CHECK (difficulty IS NULL OR difficulty > 0),
                    lapses INTEGER NOT NULL DEFAULT 0 CHECK (lapses >= 0),
                    state TEXT NOT NULL
                        CHECK (state IN ('new', 'learning', 'review', 'relearning')),
                    last_review_date INTEGER,
                    version INTEGER NOT NULL DEFAULT 0 CHECK (version >= 0),
                    UNIQUE (owner_id, flashcard_id),
                    FOREIGN KEY (flashcard_id) REFERENCES flashcards(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_flashcards_deck
                    ON flashcards(deck_id, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_study_records_owner_due
                    ON study_records(owner_id, due_date);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_study_records_owner_reviewed
                    ON study_records(owner_id, last_review_date);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        log::debug!("applied schema migration 1");
    }

    Ok(())
}
