// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Announcement history records.
//!
//! Entries are produced by the switching machine; storage, querying and
//! export live in the `dab-history` crate behind [`HistorySink`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::announcement::signal::AnnouncementSignal;
use crate::announcement::{AnnouncementType, ChannelId};
use crate::switching::gate::RejectReason;
use crate::switching::machine::ActiveAnnouncement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Played,
    Skipped,
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Played => "played",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        })
    }
}

/// Operational failure reported by the tuner or the service directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    SubchannelNotFound,
    ServiceUnsupported,
    RetuneTimeout,
    TunerFault,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SubchannelNotFound => "sub-channel not found",
            Self::ServiceUnsupported => "service does not support announcements",
            Self::RetuneTimeout => "retune timed out",
            Self::TunerFault => "tuner fault",
        })
    }
}

/// Why a played announcement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Stopped,
    MaxDurationExceeded,
    Manual,
    Preempted,
    Abandoned,
    /// The announcement sub-channel could not be tuned
    RetuneFailed,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::MaxDurationExceeded => "maximum duration exceeded",
            Self::Manual => "manual",
            Self::Preempted => "pre-empted",
            Self::Abandoned => "abandoned",
            Self::RetuneFailed => "retune failed",
        })
    }
}

/// Immutable record of one announcement lifecycle outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub announcement_type: AnnouncementType,
    pub cluster: u8,
    /// Sub-channel that carried (or would have carried) the announcement
    pub service: ChannelId,
    /// Service that was interrupted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ChannelId>,
    pub priority: i32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<RejectReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
}

impl HistoryEntry {
    fn from_signal(
        signal: &AnnouncementSignal,
        origin: Option<ChannelId>,
        started_at: DateTime<Utc>,
        outcome: Outcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            announcement_type: signal.announcement_type,
            cluster: signal.cluster,
            service: signal.target.clone(),
            origin,
            priority: signal.priority,
            started_at,
            ended_at: None,
            outcome,
            skip_reason: None,
            failure: None,
            end_reason: None,
        }
    }

    /// An announcement that went on air and has now ended.
    ///
    /// `ended_at` is clamped so a played entry never ends before it started.
    pub fn played(active: &ActiveAnnouncement, ended_at: DateTime<Utc>, reason: EndReason) -> Self {
        let mut entry = Self::from_signal(
            &active.signal,
            active.origin.clone(),
            active.started_at,
            Outcome::Played,
        );
        entry.ended_at = Some(ended_at.max(active.started_at));
        entry.end_reason = Some(reason);
        entry
    }

    pub fn skipped(
        signal: &AnnouncementSignal,
        origin: Option<ChannelId>,
        at: DateTime<Utc>,
        reason: RejectReason,
    ) -> Self {
        let mut entry = Self::from_signal(signal, origin, at, Outcome::Skipped);
        entry.skip_reason = Some(reason);
        entry
    }

    pub fn failed(
        signal: &AnnouncementSignal,
        origin: Option<ChannelId>,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        reason: FailureReason,
    ) -> Self {
        let mut entry = Self::from_signal(signal, origin, started_at, Outcome::Failed);
        entry.ended_at = ended_at.map(|t| t.max(started_at));
        entry.failure = Some(reason);
        entry
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }

    /// Human-readable reason column for listings and CSV.
    pub fn reason_text(&self) -> Option<String> {
        self.skip_reason
            .map(|r| r.to_string())
            .or_else(|| self.failure.map(|r| r.to_string()))
            .or_else(|| self.end_reason.map(|r| r.to_string()))
    }
}

/// Destination for history entries produced by the engine.
pub trait HistorySink: Send + Sync {
    /// Append one entry; must not block on slow I/O for long.
    fn record(&self, entry: HistoryEntry);

    /// Apply a new retention limit, evicting oldest entries if needed.
    fn set_capacity(&self, max_entries: usize);
}
