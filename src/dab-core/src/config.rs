// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Announcement switching policy.
//!
//! The policy is replaced as a whole; the engine never mutates it in place,
//! so a single switching decision always sees one consistent value.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::announcement::AnnouncementType;

/// Raised at the configuration boundary; the previous policy stays active.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid configuration: {0}")]
pub struct InvalidConfiguration(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnouncementConfig {
    /// Master switch for announcement switching
    pub enabled: bool,
    /// Types allowed to interrupt the current service
    pub enabled_types: BTreeSet<AnnouncementType>,
    /// Minimum signal priority eligible for switching (higher = more urgent)
    pub priority_threshold: i32,
    /// Safety limit after which the receiver returns to the original service
    pub max_duration_secs: i64,
    /// Whether the listener may cut an announcement short
    pub allow_manual_return: bool,
    /// History ledger capacity
    pub max_history_entries: i64,
    /// Clear the history ledger when the receiver shuts down
    pub auto_clear_on_exit: bool,
    /// Ensemble Al flag: alarm-cluster alarms always switch when set, never when clear
    pub ensemble_alarm: bool,
}

impl Default for AnnouncementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enabled_types: AnnouncementType::ALL.into_iter().collect(),
            priority_threshold: 0,
            max_duration_secs: 300,
            allow_manual_return: true,
            max_history_entries: 500,
            auto_clear_on_exit: false,
            ensemble_alarm: true,
        }
    }
}

impl AnnouncementConfig {
    pub fn validate(&self) -> Result<(), InvalidConfiguration> {
        if self.priority_threshold < 0 {
            return Err(InvalidConfiguration(format!(
                "priority_threshold must be >= 0 (got {})",
                self.priority_threshold
            )));
        }
        if self.max_duration_secs <= 0 {
            return Err(InvalidConfiguration(format!(
                "max_duration_secs must be > 0 (got {})",
                self.max_duration_secs
            )));
        }
        if self.max_history_entries < 1 {
            return Err(InvalidConfiguration(format!(
                "max_history_entries must be >= 1 (got {})",
                self.max_history_entries
            )));
        }
        Ok(())
    }

    /// Validate and hand the value back, for builder-style call sites.
    pub fn validated(self) -> Result<Self, InvalidConfiguration> {
        self.validate()?;
        Ok(self)
    }

    pub fn is_type_enabled(&self, ty: AnnouncementType) -> bool {
        self.enabled_types.contains(&ty)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs.max(0) as u64)
    }

    pub fn history_capacity(&self) -> usize {
        self.max_history_entries.max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AnnouncementConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.enabled_types.len(), 11);
        assert_eq!(cfg.max_duration(), Duration::from_secs(300));
        assert_eq!(cfg.history_capacity(), 500);
    }

    #[test]
    fn test_rejects_negative_threshold() {
        let cfg = AnnouncementConfig {
            priority_threshold: -1,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("priority_threshold"));
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        for secs in [0, -30] {
            let cfg = AnnouncementConfig {
                max_duration_secs: secs,
                ..Default::default()
            };
            assert!(cfg.validate().is_err(), "{secs} accepted");
        }
    }

    #[test]
    fn test_rejects_empty_history() {
        let cfg = AnnouncementConfig {
            max_history_entries: 0,
            ..Default::default()
        };
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn test_parse_partial_keeps_defaults() {
        let cfg: AnnouncementConfig = serde_json::from_str(
            r#"{"enabled_types":["traffic","alarm"],"priority_threshold":5}"#,
        )
        .unwrap();
        assert!(cfg.is_type_enabled(AnnouncementType::Traffic));
        assert!(!cfg.is_type_enabled(AnnouncementType::Weather));
        assert_eq!(cfg.priority_threshold, 5);
        assert_eq!(cfg.max_duration_secs, 300);
        assert!(cfg.allow_manual_return);
    }
}
