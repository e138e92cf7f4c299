use std::fmt;

use chrono::{DateTime, Utc};
use env_logger::Env;
use recall_core::model::{Deck, DeckId, Flashcard, FlashcardId, OwnerId};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    deck_id: DeckId,
    owner_id: OwnerId,
    deck_name: String,
    cards: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDeckId { raw: String },
    InvalidOwnerId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
    InvalidCards { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDeckId { raw } => write!(f, "invalid --deck value: {raw}"),
            ArgsError::InvalidOwnerId { raw } => write!(f, "invalid --owner value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
            ArgsError::InvalidCards { raw } => write!(f, "invalid --cards value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("RECALL_DB_URL").unwrap_or_else(|_| "sqlite://recall.sqlite3?mode=rwc".into());
        let mut deck_id = std::env::var("RECALL_DECK_ID")
            .ok()
            .and_then(|value| value.parse::<DeckId>().ok())
            .unwrap_or_else(|| DeckId::new(1));
        let mut owner_id = std::env::var("RECALL_OWNER_ID")
            .ok()
            .and_then(|value| value.parse::<OwnerId>().ok())
            .unwrap_or_else(|| OwnerId::new(1));
        let mut deck_name =
            std::env::var("RECALL_DECK_NAME").unwrap_or_else(|_| "German basics".into());
        let mut cards = std::env::var("RECALL_CARDS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(5);
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--deck" => {
                    let value = require_value(&mut args, "--deck")?;
                    deck_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidDeckId { raw: value.clone() })?;
                }
                "--owner" => {
                    let value = require_value(&mut args, "--owner")?;
                    owner_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidOwnerId { raw: value.clone() })?;
                }
                "--deck-name" => {
                    deck_name = require_value(&mut args, "--deck-name")?;
                }
                "--cards" => {
                    let value = require_value(&mut args, "--cards")?;
                    cards = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidCards { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            deck_id,
            owner_id,
            deck_name,
            cards,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://recall.sqlite3?mode=rwc)");
    eprintln!("  --deck <id>               Deck id to upsert (default: 1)");
    eprintln!("  --owner <id>              Owner of the deck (default: 1)");
    eprintln!("  --deck-name <name>        Deck name (default: German basics)");
    eprintln!("  --cards <n>               Number of sample flashcards to upsert (default: 5)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  RECALL_DB_URL, RECALL_DECK_ID, RECALL_OWNER_ID, RECALL_DECK_NAME, RECALL_CARDS"
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let deck = Deck::new(args.deck_id, args.owner_id, args.deck_name.clone(), now)?;
    storage.decks.upsert_deck(&deck).await?;

    // Flashcard ids are derived from the deck id so seeding several decks
    // into one database does not overwrite earlier cards.
    let samples = [
        ("Hallo", "Hello"),
        ("Danke", "Thank you"),
        ("Bitte", "Please / You are welcome"),
        ("Tschuss", "Bye"),
        ("Guten Morgen", "Good morning"),
    ];
    let base = deck.id().value().saturating_mul(10_000);
    for (i, (front, back)) in samples.iter().cycle().take(args.cards as usize).enumerate() {
        let card = Flashcard::new(
            FlashcardId::new(base + i as u64 + 1),
            deck.id(),
            *front,
            *back,
            now,
        )?;
        storage.flashcards.upsert_flashcard(&card).await?;
    }
    log::info!("seeded deck {} with {} flashcards", deck.id(), args.cards);

    println!(
        "Seeded deck {} (owner {}) with {} flashcards into {}",
        deck.id(),
        deck.owner_id(),
        args.cards,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
