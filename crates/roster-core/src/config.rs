//! Engine configuration
//!
//! Defaults match a small guild bot: delayed promotion after 5 minutes, a
//! 10 second scheduler tick, signups closing 10 minutes after start.
//!
//! Sources, lowest priority first: [`RosterConfig::default`], a TOML file,
//! then environment overrides (`RAIDS_PATH`, `ROSTER_PROMOTION_POLICY`).

use crate::error::ConfigError;
use roster_model::{PromotionPolicy, VacancyRules, DEFAULT_SECONDARY_LIMIT};
use roster_text::ScheduleZone;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage path override
pub const ENV_STORAGE_PATH: &str = "RAIDS_PATH";
/// Promotion policy override (`immediate` | `delayed`)
pub const ENV_PROMOTION_POLICY: &str = "ROSTER_PROMOTION_POLICY";

/// Roster engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// JSON file holding every panel
    pub storage_path: PathBuf,
    /// How vacancies are filled
    pub promotion_policy: PromotionPolicy,
    /// Delay before a scheduled promotion applies, in seconds
    pub promotion_delay_secs: u64,
    /// Scheduler tick period in seconds (10-60)
    pub tick_secs: u64,
    /// Signups close this long after the event start, in seconds
    pub close_grace_secs: u64,
    /// Quiet period before a burst of mutations is written out, in milliseconds
    pub save_debounce_ms: u64,
    /// Upper bound for one notification or render delivery, in milliseconds
    pub delivery_timeout_ms: u64,
    /// Secondary entries allowed per participant
    pub secondary_limit: usize,
    /// Fixed UTC offset for schedule text; absent means the host zone
    pub utc_offset_minutes: Option<i32>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("raids.json"),
            promotion_policy: PromotionPolicy::Delayed,
            promotion_delay_secs: 5 * 60,
            tick_secs: 10,
            close_grace_secs: 10 * 60,
            save_debounce_ms: 500,
            delivery_timeout_ms: 5_000,
            secondary_limit: DEFAULT_SECONDARY_LIMIT,
            utc_offset_minutes: None,
        }
    }
}

impl RosterConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With storage path
    #[inline]
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// With promotion policy
    #[inline]
    #[must_use]
    pub fn with_promotion_policy(mut self, policy: PromotionPolicy) -> Self {
        self.promotion_policy = policy;
        self
    }

    /// With promotion delay
    #[inline]
    #[must_use]
    pub fn with_promotion_delay(mut self, delay: Duration) -> Self {
        self.promotion_delay_secs = delay.as_secs();
        self
    }

    /// With scheduler tick
    #[inline]
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick_secs = tick.as_secs();
        self
    }

    /// With close grace period
    #[inline]
    #[must_use]
    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace_secs = grace.as_secs();
        self
    }

    /// With save debounce window
    #[inline]
    #[must_use]
    pub fn with_save_debounce(mut self, debounce: Duration) -> Self {
        self.save_debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With delivery timeout
    #[inline]
    #[must_use]
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With secondary entry limit
    #[inline]
    #[must_use]
    pub fn with_secondary_limit(mut self, limit: usize) -> Self {
        self.secondary_limit = limit;
        self
    }

    /// With fixed UTC offset for schedule text
    #[inline]
    #[must_use]
    pub fn with_utc_offset_minutes(mut self, minutes: Option<i32>) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Parse TOML text; missing keys keep their defaults
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML or wrong value types
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` on malformed TOML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment
    ///
    /// # Errors
    /// - `ConfigError::Env` for an unrecognised policy value
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    ///
    /// # Errors
    /// - `ConfigError::Env` for an unrecognised policy value
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = lookup(ENV_STORAGE_PATH).filter(|p| !p.trim().is_empty()) {
            self.storage_path = PathBuf::from(path);
        }
        if let Some(policy) = lookup(ENV_PROMOTION_POLICY) {
            self.promotion_policy = policy.parse().map_err(|reason| ConfigError::Env {
                var: ENV_PROMOTION_POLICY,
                value: policy.clone(),
                reason,
            })?;
        }
        Ok(self)
    }

    /// Reject out-of-range values
    ///
    /// # Errors
    /// - `ConfigError::InvalidValue` naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| {
            Err(ConfigError::InvalidValue {
                field,
                reason: reason.to_string(),
            })
        };

        if !(10..=60).contains(&self.tick_secs) {
            return invalid("tick_secs", "must be between 10 and 60");
        }
        if self.secondary_limit == 0 {
            return invalid("secondary_limit", "must be at least 1");
        }
        if self.delivery_timeout_ms == 0 {
            return invalid("delivery_timeout_ms", "must be positive");
        }
        if self.save_debounce_ms > 60_000 {
            return invalid("save_debounce_ms", "must not exceed 60000");
        }
        if self.promotion_delay_secs > MAX_PERIOD_SECS {
            return invalid("promotion_delay_secs", "must not exceed a week");
        }
        if self.close_grace_secs > MAX_PERIOD_SECS {
            return invalid("close_grace_secs", "must not exceed a week");
        }
        if let Some(minutes) = self.utc_offset_minutes {
            if minutes.abs() >= 24 * 60 {
                return invalid("utc_offset_minutes", "must be within a day");
            }
        }
        if self.storage_path.as_os_str().is_empty() {
            return invalid("storage_path", "must not be empty");
        }
        Ok(())
    }

    /// Vacancy rules for roster transitions
    #[must_use]
    pub fn vacancy_rules(&self) -> VacancyRules {
        VacancyRules {
            policy: self.promotion_policy,
            delay: secs(self.promotion_delay_secs),
            secondary_limit: self.secondary_limit,
        }
    }

    /// Scheduler tick period
    #[inline]
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Close grace period
    #[inline]
    #[must_use]
    pub fn close_grace(&self) -> chrono::Duration {
        secs(self.close_grace_secs)
    }

    /// Save debounce window
    #[inline]
    #[must_use]
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    /// Delivery timeout
    #[inline]
    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Zone for interpreting schedule text
    #[inline]
    #[must_use]
    pub fn zone(&self) -> ScheduleZone {
        ScheduleZone::from_offset_minutes(self.utc_offset_minutes)
    }
}

const MAX_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;

fn secs(value: u64) -> chrono::Duration {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
