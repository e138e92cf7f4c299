use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("minimum ease must be finite and > 0, got {provided}")]
    InvalidMinimumEase { provided: f64 },

    #[error("initial ease must be finite and >= minimum ease, got {provided}")]
    InvalidInitialEase { provided: f64 },

    #[error("fallback ease must be finite and >= minimum ease, got {provided}")]
    InvalidFallbackEase { provided: f64 },

    #[error("graduating intervals must be > 0 and non-decreasing")]
    InvalidGraduatingIntervals,

    #[error("maximum interval must be >= the second graduating interval, got {provided}")]
    InvalidMaximumInterval { provided: u32 },

    #[error("session limit must be > 0")]
    InvalidSessionLimit,

    #[error("streak lookback must be > 0 days")]
    InvalidStreakLookback,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Tunables for the retention update and the services built on it.
///
/// The defaults reproduce the production behavior:
/// - records start with an ease of 5.0
/// - the update formula falls back to 2.5 when a record has no ease
/// - ease never drops below 1.3
/// - the first two successful recalls graduate after 1 and 6 days
/// - no interval grows beyond 36500 days
/// - sessions hold at most 20 cards
/// - streaks look back at most 365 days
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    initial_ease: f64,
    fallback_ease: f64,
    minimum_ease: f64,
    first_interval_days: u32,
    second_interval_days: u32,
    maximum_interval_days: u32,
    session_limit: u32,
    streak_lookback_days: u32,
}

impl SchedulerSettings {
    /// Creates validated settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if an ease is non-finite or below the minimum,
    /// if the graduating intervals are zero or decreasing, if the maximum
    /// interval is below the second graduating interval, or if the session
    /// limit or streak lookback is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        initial_ease: f64,
        fallback_ease: f64,
        minimum_ease: f64,
        first_interval_days: u32,
        second_interval_days: u32,
        maximum_interval_days: u32,
        session_limit: u32,
        streak_lookback_days: u32,
    ) -> Result<Self, SettingsError> {
        if !minimum_ease.is_finite() || minimum_ease <= 0.0 {
            return Err(SettingsError::InvalidMinimumEase {
                provided: minimum_ease,
            });
        }
        if !initial_ease.is_finite() || initial_ease < minimum_ease {
            return Err(SettingsError::InvalidInitialEase {
                provided: initial_ease,
            });
        }
        if !fallback_ease.is_finite() || fallback_ease < minimum_ease {
            return Err(SettingsError::InvalidFallbackEase {
                provided: fallback_ease,
            });
        }
        if first_interval_days == 0 || second_interval_days < first_interval_days {
            return Err(SettingsError::InvalidGraduatingIntervals);
        }
        if maximum_interval_days < second_interval_days {
            return Err(SettingsError::InvalidMaximumInterval {
                provided: maximum_interval_days,
            });
        }
        if session_limit == 0 {
            return Err(SettingsError::InvalidSessionLimit);
        }
        if streak_lookback_days == 0 {
            return Err(SettingsError::InvalidStreakLookback);
        }

        Ok(Self {
            initial_ease,
            fallback_ease,
            minimum_ease,
            first_interval_days,
            second_interval_days,
            maximum_interval_days,
            session_limit,
            streak_lookback_days,
        })
    }

    /// Ease assigned to a freshly initialized record.
    #[must_use]
    pub fn initial_ease(&self) -> f64 {
        self.initial_ease
    }

    /// Ease used by the update formula when a record carries none.
    #[must_use]
    pub fn fallback_ease(&self) -> f64 {
        self.fallback_ease
    }

    #[must_use]
    pub fn minimum_ease(&self) -> f64 {
        self.minimum_ease
    }

    #[must_use]
    pub fn first_interval_days(&self) -> u32 {
        self.first_interval_days
    }

    #[must_use]
    pub fn second_interval_days(&self) -> u32 {
        self.second_interval_days
    }

    /// Upper bound on any scheduled interval.
    #[must_use]
    pub fn maximum_interval_days(&self) -> u32 {
        self.maximum_interval_days
    }

    #[must_use]
    pub fn session_limit(&self) -> u32 {
        self.session_limit
    }

    #[must_use]
    pub fn streak_lookback_days(&self) -> u32 {
        self.streak_lookback_days
    }

    /// Returns a copy with a different session limit.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidSessionLimit` if `limit` is zero.
    pub fn with_session_limit(&self, limit: u32) -> Result<Self, SettingsError> {
        if limit == 0 {
            return Err(SettingsError::InvalidSessionLimit);
        }
        Ok(Self {
            session_limit: limit,
            ..self.clone()
        })
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            initial_ease: 5.0,
            fallback_ease: 2.5,
            minimum_ease: 1.3,
            first_interval_days: 1,
            second_interval_days: 6,
            maximum_interval_days: 36_500,
            session_limit: 20,
            streak_lookback_days: 365,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
