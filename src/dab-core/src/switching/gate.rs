// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Signal gate: the accept/reject policy for announcement start signals.
//!
//! `decide` only reads its arguments, so it can be called from any thread
//! and as often as needed.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::announcement::signal::AnnouncementSignal;
use crate::announcement::support::ServiceAnnouncementSupport;
use crate::config::AnnouncementConfig;
use crate::history::FailureReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Announcement switching is turned off
    SwitchingDisabled,
    /// Alarm-cluster alarm while the ensemble Al flag is clear
    AlarmSuppressed,
    /// Not strictly more urgent than the announcement on air
    OutrankedByActive,
    TypeDisabled,
    PriorityTooLow,
    /// The interrupted service does not take part in this announcement
    ServiceUnsupported,
}

impl RejectReason {
    /// Policy rejections are recorded as skipped; the rest as failed.
    pub fn is_policy(self) -> bool {
        !matches!(self, Self::ServiceUnsupported)
    }

    pub fn as_failure(self) -> Option<FailureReason> {
        match self {
            Self::ServiceUnsupported => Some(FailureReason::ServiceUnsupported),
            _ => None,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SwitchingDisabled => "switching disabled",
            Self::AlarmSuppressed => "ensemble alarm disabled",
            Self::OutrankedByActive => "outranked by active announcement",
            Self::TypeDisabled => "type disabled",
            Self::PriorityTooLow => "priority too low",
            Self::ServiceUnsupported => "service unsupported",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Decide whether `signal` may pre-empt the current service.
///
/// `active_priority` is the priority of the announcement on air, if any;
/// `origin_support` is the FIG 0/18 entry of the interrupted service, when
/// known. A missing entry places no restriction.
pub fn decide(
    signal: &AnnouncementSignal,
    config: &AnnouncementConfig,
    active_priority: Option<i32>,
    origin_support: Option<&ServiceAnnouncementSupport>,
) -> Verdict {
    let verdict = evaluate(signal, config, active_priority, origin_support);
    debug!("Gate: {} -> {:?}", signal, verdict);
    verdict
}

fn evaluate(
    signal: &AnnouncementSignal,
    config: &AnnouncementConfig,
    active_priority: Option<i32>,
    origin_support: Option<&ServiceAnnouncementSupport>,
) -> Verdict {
    if !config.enabled {
        return Verdict::Reject(RejectReason::SwitchingDisabled);
    }

    // Equal priority never pre-empts: the announcement on air wins ties.
    if let Some(current) = active_priority {
        if signal.priority <= current {
            return Verdict::Reject(RejectReason::OutrankedByActive);
        }
    }

    // The Al flag overrides listener preferences for alarm-cluster alarms.
    if signal.is_ensemble_alarm() {
        return if config.ensemble_alarm {
            Verdict::Accept
        } else {
            Verdict::Reject(RejectReason::AlarmSuppressed)
        };
    }

    if !config.is_type_enabled(signal.announcement_type) {
        return Verdict::Reject(RejectReason::TypeDisabled);
    }
    if signal.priority < config.priority_threshold {
        return Verdict::Reject(RejectReason::PriorityTooLow);
    }
    if let Some(support) = origin_support {
        if !support.accepts(signal) {
            return Verdict::Reject(RejectReason::ServiceUnsupported);
        }
    }

    Verdict::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announcement::signal::ALARM_CLUSTER;
    use crate::announcement::{AnnouncementFlags, AnnouncementType};

    fn config() -> AnnouncementConfig {
        AnnouncementConfig {
            enabled_types: [AnnouncementType::Traffic, AnnouncementType::Alarm]
                .into_iter()
                .collect(),
            priority_threshold: 5,
            max_duration_secs: 60,
            ..Default::default()
        }
    }

    fn traffic(priority: i32) -> AnnouncementSignal {
        AnnouncementSignal::start(AnnouncementType::Traffic, 2, "T1", priority)
    }

    #[test]
    fn test_accepts_enabled_type_above_threshold() {
        assert_eq!(decide(&traffic(7), &config(), None, None), Verdict::Accept);
        assert_eq!(decide(&traffic(5), &config(), None, None), Verdict::Accept);
    }

    #[test]
    fn test_rejects_disabled_type() {
        let weather = AnnouncementSignal::start(AnnouncementType::Weather, 2, "W1", 9);
        assert_eq!(
            decide(&weather, &config(), None, None),
            Verdict::Reject(RejectReason::TypeDisabled)
        );
    }

    #[test]
    fn test_rejects_below_threshold() {
        assert_eq!(
            decide(&traffic(4), &config(), None, None),
            Verdict::Reject(RejectReason::PriorityTooLow)
        );
    }

    #[test]
    fn test_equal_priority_does_not_preempt() {
        assert_eq!(
            decide(&traffic(7), &config(), Some(7), None),
            Verdict::Reject(RejectReason::OutrankedByActive)
        );
        assert_eq!(decide(&traffic(8), &config(), Some(7), None), Verdict::Accept);
    }

    #[test]
    fn test_master_switch() {
        let cfg = AnnouncementConfig {
            enabled: false,
            ..config()
        };
        assert_eq!(
            decide(&traffic(9), &cfg, None, None),
            Verdict::Reject(RejectReason::SwitchingDisabled)
        );
    }

    #[test]
    fn test_origin_support_restricts_clusters() {
        let support = ServiceAnnouncementSupport::new(
            "P1",
            [AnnouncementType::Traffic].into_iter().collect::<AnnouncementFlags>(),
            vec![1],
        );
        let verdict = decide(&traffic(7), &config(), None, Some(&support));
        assert_eq!(verdict, Verdict::Reject(RejectReason::ServiceUnsupported));
        assert!(!RejectReason::ServiceUnsupported.is_policy());
        assert_eq!(
            RejectReason::ServiceUnsupported.as_failure(),
            Some(FailureReason::ServiceUnsupported)
        );
    }

    #[test]
    fn test_ensemble_alarm_overrides_preferences() {
        let cfg = AnnouncementConfig {
            enabled_types: Default::default(),
            priority_threshold: 100,
            ..config()
        };
        let alarm = AnnouncementSignal::start(AnnouncementType::Alarm, ALARM_CLUSTER, "A1", 11);
        assert_eq!(decide(&alarm, &cfg, None, None), Verdict::Accept);

        let suppressed = AnnouncementConfig {
            ensemble_alarm: false,
            ..config()
        };
        assert_eq!(
            decide(&alarm, &suppressed, None, None),
            Verdict::Reject(RejectReason::AlarmSuppressed)
        );
    }
}
