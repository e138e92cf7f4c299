#![forbid(unsafe_code)]

pub mod access;
pub mod engine;
pub mod error;
pub mod review_service;
pub mod selection;
pub mod session_service;
pub mod stats_service;

pub use recall_core::Clock;

pub use access::authorize_deck;
pub use engine::SchedulingEngine;
pub use error::{
    AccessError, EngineError, ErrorKind, ReviewServiceError, SessionError, StatsError,
};
pub use review_service::{ReviewSchedule, ReviewService};
pub use selection::{DueCard, DueCardSelector};
pub use session_service::{SessionService, StudySession};
pub use stats_service::StatsService;
