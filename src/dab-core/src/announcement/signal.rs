// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{AnnouncementType, ChannelId};

/// Cluster reserved for ensemble-wide alarm announcements.
pub const ALARM_CLUSTER: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Start,
    Stop,
}

/// One announcement switching event from the broadcast layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementSignal {
    #[serde(rename = "type")]
    pub announcement_type: AnnouncementType,
    pub cluster: u8,
    pub target: ChannelId,
    pub priority: i32,
    pub kind: SignalKind,
}

impl AnnouncementSignal {
    pub fn start(
        announcement_type: AnnouncementType,
        cluster: u8,
        target: impl Into<ChannelId>,
        priority: i32,
    ) -> Self {
        Self {
            announcement_type,
            cluster,
            target: target.into(),
            priority,
            kind: SignalKind::Start,
        }
    }

    pub fn stop(
        announcement_type: AnnouncementType,
        cluster: u8,
        target: impl Into<ChannelId>,
    ) -> Self {
        Self {
            announcement_type,
            cluster,
            target: target.into(),
            priority: announcement_type.default_priority(),
            kind: SignalKind::Stop,
        }
    }

    pub fn is_start(&self) -> bool {
        self.kind == SignalKind::Start
    }

    /// Alarm on the alarm cluster, governed by the ensemble Al flag.
    pub fn is_ensemble_alarm(&self) -> bool {
        self.cluster == ALARM_CLUSTER && self.announcement_type == AnnouncementType::Alarm
    }

    /// True when `other` refers to the same announcement on air.
    pub fn same_announcement(&self, other: &AnnouncementSignal) -> bool {
        self.cluster == other.cluster
            && self.target == other.target
            && self.announcement_type == other.announcement_type
    }
}

impl fmt::Display for AnnouncementSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} cluster={} target={} priority={}",
            self.kind, self.announcement_type, self.cluster, self.target, self.priority
        )
    }
}
