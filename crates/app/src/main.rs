use std::fmt;

use chrono::{DateTime, Utc};
use env_logger::Env;
use recall_core::model::{DeckId, FlashcardId, OwnerId, Rating, SchedulerSettings, StudyRecordId};
use serde::Serialize;
use services::{Clock, ErrorKind, SchedulingEngine};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidLimit { raw: String },
    InvalidRating { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidLimit { raw } => write!(f, "invalid --limit value: {raw}"),
            ArgsError::InvalidRating { raw } => {
                write!(f, "invalid --rating value (expected again, good or easy): {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

/// A service failure tagged with its boundary classification.
#[derive(Debug)]
struct CommandError {
    kind: ErrorKind,
    source: Box<dyn std::error::Error>,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, status {})",
            self.source,
            self.kind,
            self.kind.status_code()
        )
    }
}

impl std::error::Error for CommandError {}

fn command_error(kind: ErrorKind, err: impl std::error::Error + 'static) -> CommandError {
    CommandError {
        kind,
        source: Box::new(err),
    }
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidId { flag, raw })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Session,
    Review,
    Preview,
    Stats,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "session" => Some(Self::Session),
            "review" => Some(Self::Review),
            "preview" => Some(Self::Preview),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    command: Command,
    db_url: String,
    owner_id: OwnerId,
    deck_id: DeckId,
    limit: Option<u32>,
    record_id: Option<StudyRecordId>,
    flashcard_id: Option<FlashcardId>,
    rating: Option<Rating>,
    now: Option<DateTime<Utc>>,
}

impl Args {
    fn parse(argv: Vec<String>) -> Result<Self, ArgsError> {
        let mut args = argv.into_iter();
        let command = match args.next() {
            Some(first) => Command::from_arg(&first).ok_or(ArgsError::UnknownCommand(first))?,
            None => return Err(ArgsError::UnknownCommand(String::new())),
        };

        let mut db_url = std::env::var("RECALL_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://recall.sqlite3".into(), normalize_sqlite_url);
        let mut owner_id = std::env::var("RECALL_OWNER_ID")
            .ok()
            .and_then(|value| value.parse::<OwnerId>().ok())
            .unwrap_or_else(|| OwnerId::new(1));
        let mut deck_id = std::env::var("RECALL_DECK_ID")
            .ok()
            .and_then(|value| value.parse::<DeckId>().ok())
            .unwrap_or_else(|| DeckId::new(1));
        let mut limit = std::env::var("RECALL_SESSION_LIMIT")
            .ok()
            .and_then(|value| value.parse::<u32>().ok());
        let mut record_id = None;
        let mut flashcard_id = None;
        let mut rating = None;
        let mut now = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--owner" => owner_id = parse_id(require_value(&mut args, "--owner")?, "--owner")?,
                "--deck" => deck_id = parse_id(require_value(&mut args, "--deck")?, "--deck")?,
                "--record" => {
                    record_id = Some(parse_id(require_value(&mut args, "--record")?, "--record")?);
                }
                "--flashcard" => {
                    flashcard_id = Some(parse_id(
                        require_value(&mut args, "--flashcard")?,
                        "--flashcard",
                    )?);
                }
                "--limit" => {
                    let value = require_value(&mut args, "--limit")?;
                    limit = Some(
                        value
                            .parse::<u32>()
                            .map_err(|_| ArgsError::InvalidLimit { raw: value.clone() })?,
                    );
                }
                "--rating" => {
                    let value = require_value(&mut args, "--rating")?;
                    rating = Some(
                        value
                            .parse::<Rating>()
                            .map_err(|_| ArgsError::InvalidRating { raw: value.clone() })?,
                    );
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
            command,
            db_url,
            owner_id,
            deck_id,
            limit,
            record_id,
            flashcard_id,
            rating,
            now,
        })
    }

    fn clock(&self) -> Clock {
        self.now.map_or_else(Clock::default_clock, Clock::fixed)
    }

    fn settings(&self) -> Result<SchedulerSettings, Box<dyn std::error::Error>> {
        let defaults = SchedulerSettings::default();
        match self.limit {
            Some(limit) => Ok(defaults.with_session_limit(limit)?),
            None => Ok(defaults),
        }
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- session [--owner <id>] [--deck <id>] [--limit <n>]");
    eprintln!(
        "  cargo run -p app -- review  --record <id> --flashcard <id> --rating <again|good|easy>"
    );
    eprintln!("  cargo run -p app -- preview --record <id>");
    eprintln!("  cargo run -p app -- stats   [--owner <id>] [--deck <id>]");
    eprintln!();
    eprintln!("Common options:");
    eprintln!("  --db <sqlite_url>    SQLite URL (default: sqlite://recall.sqlite3)");
    eprintln!("  --now <rfc3339>      Fixed current time");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RECALL_DB_URL, RECALL_OWNER_ID, RECALL_DECK_ID, RECALL_SESSION_LIMIT, RUST_LOG");
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if matches!(argv.first().map(String::as_str), None | Some("--help" | "-h")) {
        print_usage();
        return Ok(());
    }

    let args = Args::parse(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&args.db_url)?;
    let engine = SchedulingEngine::new_sqlite(&args.db_url, args.clock(), args.settings()?).await?;
    log::debug!("opened {} for owner {}", args.db_url, args.owner_id);

    match args.command {
        Command::Session => {
            let session = engine
                .initialize_session(args.owner_id, args.deck_id, None)
                .await
                .map_err(|e| command_error(e.kind(), e))?;
            print_json(&session)
        }
        Command::Review => {
            let record_id = args
                .record_id
                .ok_or(ArgsError::MissingFlag { flag: "--record" })?;
            let flashcard_id = args
                .flashcard_id
                .ok_or(ArgsError::MissingFlag { flag: "--flashcard" })?;
            let rating = args
                .rating
                .ok_or(ArgsError::MissingFlag { flag: "--rating" })?;
            let schedule = engine
                .process_review(args.owner_id, record_id, flashcard_id, rating)
                .await
                .map_err(|e| command_error(e.kind(), e))?;
            print_json(&schedule)
        }
        Command::Preview => {
            let record_id = args
                .record_id
                .ok_or(ArgsError::MissingFlag { flag: "--record" })?;
            let states = engine
                .preview_review(args.owner_id, record_id)
                .await
                .map_err(|e| command_error(e.kind(), e))?;
            print_json(&states)
        }
        Command::Stats => {
            let stats = engine
                .deck_statistics(args.owner_id, args.deck_id)
                .await
                .map_err(|e| command_error(e.kind(), e))?;
            print_json(&stats)
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_review_command() {
        let args = Args::parse(argv(&[
            "review",
            "--record",
            "4",
            "--flashcard",
            "9",
            "--rating",
            "Easy",
            "--now",
            "2023-11-14T22:13:20Z",
        ]))
        .unwrap();
        assert_eq!(args.command, Command::Review);
        assert_eq!(args.record_id, Some(StudyRecordId::new(4)));
        assert_eq!(args.flashcard_id, Some(FlashcardId::new(9)));
        assert_eq!(args.rating, Some(Rating::Easy));
        assert!(args.clock().is_fixed());
    }

    #[test]
    fn rejects_unknown_rating_and_command() {
        let err = Args::parse(argv(&["review", "--rating", "hard"])).unwrap_err();
        assert!(matches!(err, ArgsError::InvalidRating { .. }));

        let err = Args::parse(argv(&["sync"])).unwrap_err();
        assert!(matches!(err, ArgsError::UnknownCommand(_)));
    }

    #[test]
    fn limit_flag_overrides_session_limit() {
        let args = Args::parse(argv(&["session", "--limit", "5"])).unwrap();
        assert_eq!(args.settings().unwrap().session_limit(), 5);

        let args = Args::parse(argv(&["session", "--limit", "0"])).unwrap();
        assert!(args.settings().is_err());
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/recall.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/recall.sqlite3"));
    }
}
