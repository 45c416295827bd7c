//! Tunable parameters of the duplicate message cooldown.

use crate::error::ConfigError;
use std::time::Duration;

/// Default number of identical messages that starts a cooldown.
pub const DEFAULT_COOLDOWN_INITIATION_THRESHOLD: u32 = 20;
/// Default length of a cooldown, in seconds.
pub const DEFAULT_COOLDOWN_DURATION_SECS: u64 = 30;
/// Default number of duplicates per second that are forgiven by decay.
pub const DEFAULT_ACCEPTABLE_DUPLICATES_PER_SECOND: u32 = 1;

/// Validated configuration for a [`CooldownFilter`](crate::CooldownFilter).
///
/// Set before activation and treated as read-only afterwards. With the `serde`
/// feature enabled the type deserializes from any serde format; missing fields
/// take their defaults and the result should be passed through
/// [`CooldownConfig::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct CooldownConfig {
    cooldown_initiation_threshold: u32,
    cooldown_duration_secs: u64,
    acceptable_duplicates_per_second: u32,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            cooldown_initiation_threshold: DEFAULT_COOLDOWN_INITIATION_THRESHOLD,
            cooldown_duration_secs: DEFAULT_COOLDOWN_DURATION_SECS,
            acceptable_duplicates_per_second: DEFAULT_ACCEPTABLE_DUPLICATES_PER_SECOND,
        }
    }
}

impl CooldownConfig {
    /// Create a config with validation.
    ///
    /// # Examples
    /// ```
    /// use hush::CooldownConfig;
    /// let config = CooldownConfig::new(20, 30, 1).unwrap();
    /// assert!(config.decay_enabled());
    /// ```
    pub fn new(
        cooldown_initiation_threshold: u32,
        cooldown_duration_secs: u64,
        acceptable_duplicates_per_second: u32,
    ) -> Result<Self, ConfigError> {
        let cfg = Self {
            cooldown_initiation_threshold,
            cooldown_duration_secs,
            acceptable_duplicates_per_second,
        };
        cfg.validate()
    }

    /// Override the threshold; must be > 0.
    pub fn with_threshold(mut self, threshold: u32) -> Result<Self, ConfigError> {
        self.cooldown_initiation_threshold = threshold;
        self.validate()
    }

    /// Override the cooldown duration in whole seconds.
    ///
    /// Zero evicts a counter as soon as the scheduler gets to it, so a message
    /// is denied only for the calls racing with that eviction.
    pub fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_duration_secs = secs;
        self
    }

    /// Override the decay rate. Zero disables decay entirely.
    pub fn with_acceptable_duplicates_per_second(mut self, rate: u32) -> Self {
        self.acceptable_duplicates_per_second = rate;
        self
    }

    /// Check the invariants, returning the config unchanged when they hold.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.cooldown_initiation_threshold == 0 {
            return Err(ConfigError::InvalidThreshold { provided: 0 });
        }
        Ok(self)
    }

    /// Duplicate count at which suppression begins.
    pub fn threshold(&self) -> u32 {
        self.cooldown_initiation_threshold
    }

    /// How long suppression lasts once triggered.
    pub fn cooldown_duration(&self) -> Duration {
        Duration::from_secs(self.cooldown_duration_secs)
    }

    /// Amount subtracted from every live counter once per second.
    pub fn acceptable_duplicates_per_second(&self) -> u32 {
        self.acceptable_duplicates_per_second
    }

    /// Whether the periodic decay sweep runs at all.
    pub fn decay_enabled(&self) -> bool {
        self.acceptable_duplicates_per_second > 0
    }
}
