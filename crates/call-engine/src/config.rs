//! Configuration for the routing core.
//!
//! Every section carries `#[serde(default)]`, so a config file only needs the
//! keys it wants to override:
//!
//! ```toml
//! [general]
//! default_queue_id = "billing"
//!
//! [routing]
//! default_strategy = "skills_based"
//!
//! [ringing]
//! ring_timeout_secs = 20
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use callcenter_infra_common::LoggingConfig;

use crate::error::{CallCenterError, Result};
use crate::routing::RoutingStrategy;

/// Call center configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallCenterConfig {
    /// General settings
    pub general: GeneralConfig,

    /// Agent selection tunables
    pub routing: RoutingConfig,

    /// Ringing / dial timeouts
    pub ringing: RingingConfig,

    /// Hold (fallback queue) behaviour
    pub hold: HoldConfig,

    /// Event bus settings
    pub events: EventsConfig,

    /// Logging settings (consumed by binaries)
    pub logging: LoggingConfig,
}

/// General call center configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Queue used when a call does not name one
    pub default_queue_id: String,

    /// Maximum number of calls tracked by the router at once
    pub max_concurrent_calls: usize,
}

/// Agent selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Strategy used when the queue store has no record of the queue
    pub default_strategy: RoutingStrategy,

    /// Priority at or above which the `priority` strategy uses `weighted`
    pub high_priority_threshold: u8,

    /// Priority at or above which the `priority` strategy uses `skills_based`
    pub medium_priority_threshold: u8,

    /// Minimum proficiency (1-5) for a skill to count as held
    pub min_skill_level: u8,

    /// Base score of every candidate under `weighted`
    pub weighted_base_score: f64,

    /// Score added per satisfaction point under `weighted`
    pub performance_bonus_per_point: f64,

    /// Score removed per concurrent call under `weighted`
    pub load_penalty_per_call: f64,

    /// Upper bound on claim attempts per routing round (0 = size of the candidate pool)
    pub max_claim_attempts: usize,
}

/// Ringing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RingingConfig {
    /// Seconds a claimed agent may ring before the dial-failure path runs
    pub ring_timeout_secs: u64,

    /// Announcement played when the call moves to another agent after a failed dial
    pub retry_message: String,
}

/// Hold configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldConfig {
    /// Initial interval between background re-checks for a free agent
    pub recheck_interval_secs: u64,

    /// Backoff ceiling for the re-check interval
    pub max_recheck_interval_secs: u64,

    /// Calls on hold longer than this are ended with reason `hold_timeout` (0 = no limit)
    pub max_hold_secs: u64,

    /// Announcement played when a call is placed on hold
    pub hold_message: String,

    /// Announcement played before hanging up on unrecoverable failure
    pub apology_message: String,
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Capacity of the local broadcast channel for event subscribers
    pub broadcast_capacity: usize,
}

impl CallCenterConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: CallCenterConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CallCenterError::config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        if self.general.default_queue_id.is_empty() {
            return Err(CallCenterError::config("default_queue_id cannot be empty"));
        }

        if self.general.max_concurrent_calls == 0 {
            return Err(CallCenterError::config("max_concurrent_calls must be greater than 0"));
        }

        let r = &self.routing;
        if r.high_priority_threshold > 10 || r.medium_priority_threshold > 10 {
            return Err(CallCenterError::config("priority thresholds must be within 0-10"));
        }

        if r.medium_priority_threshold > r.high_priority_threshold {
            return Err(CallCenterError::config(format!(
                "medium_priority_threshold ({}) cannot exceed high_priority_threshold ({})",
                r.medium_priority_threshold, r.high_priority_threshold
            )));
        }

        if !(1..=5).contains(&r.min_skill_level) {
            return Err(CallCenterError::config("min_skill_level must be within 1-5"));
        }

        if self.ringing.ring_timeout_secs == 0 {
            return Err(CallCenterError::config("ring_timeout_secs must be greater than 0"));
        }

        if self.hold.recheck_interval_secs == 0 {
            return Err(CallCenterError::config("recheck_interval_secs must be greater than 0"));
        }

        if self.hold.max_recheck_interval_secs < self.hold.recheck_interval_secs {
            return Err(CallCenterError::config(
                "max_recheck_interval_secs cannot be lower than recheck_interval_secs",
            ));
        }

        if self.events.broadcast_capacity == 0 {
            return Err(CallCenterError::config("broadcast_capacity must be greater than 0"));
        }

        Ok(())
    }
}

impl RingingConfig {
    pub fn ring_timeout(&self) -> Duration {
        Duration::from_secs(self.ring_timeout_secs)
    }
}

impl HoldConfig {
    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval_secs)
    }

    pub fn max_recheck_interval(&self) -> Duration {
        Duration::from_secs(self.max_recheck_interval_secs)
    }

    pub fn max_hold(&self) -> Duration {
        Duration::from_secs(self.max_hold_secs)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_queue_id: "support-queue".to_string(),
            max_concurrent_calls: 1000,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_strategy: RoutingStrategy::RoundRobin,
            high_priority_threshold: 8,
            medium_priority_threshold: 5,
            min_skill_level: 3,
            weighted_base_score: 100.0,
            performance_bonus_per_point: 10.0,
            load_penalty_per_call: 20.0,
            max_claim_attempts: 0,
        }
    }
}

impl Default for RingingConfig {
    fn default() -> Self {
        Self {
            ring_timeout_secs: 30,
            retry_message: "Connecting you to another available agent.".to_string(),
        }
    }
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            recheck_interval_secs: 2,
            max_recheck_interval_secs: 30,
            max_hold_secs: 300,
            hold_message: "All our agents are currently busy. Please hold while we connect you to the next available agent.".to_string(),
            apology_message: "We're experiencing technical difficulties. Please try again later.".to_string(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CallCenterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.default_queue_id, "support-queue");
        assert_eq!(config.ringing.ring_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_overrides_defaults() {
        let config = CallCenterConfig::from_toml_str(
            r#"
            [general]
            default_queue_id = "billing"

            [routing]
            default_strategy = "skills_based"
            min_skill_level = 4

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.general.default_queue_id, "billing");
        assert_eq!(config.routing.default_strategy, RoutingStrategy::SkillsBased);
        assert_eq!(config.routing.min_skill_level, 4);
        assert_eq!(config.routing.high_priority_threshold, 8);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_rejects_inverted_priority_thresholds() {
        let mut config = CallCenterConfig::default();
        config.routing.medium_priority_threshold = 9;
        config.routing.high_priority_threshold = 6;
        assert!(matches!(config.validate(), Err(CallCenterError::Config(_))));
    }

    #[test]
    fn test_rejects_skill_level_out_of_scale() {
        let mut config = CallCenterConfig::default();
        config.routing.min_skill_level = 0;
        assert!(config.validate().is_err());
        config.routing.min_skill_level = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_strategy_is_a_config_error() {
        let err = CallCenterConfig::from_toml_str("[routing]\ndefault_strategy = \"random\"\n").unwrap_err();
        assert!(matches!(err, CallCenterError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_a_config_error() {
        let err = CallCenterConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, CallCenterError::Config(_)));
    }
}
