// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transport DTOs for the JSON line protocol.

use serde::{Deserialize, Serialize};

use dab_core::{
    AnnouncementConfig, AnnouncementType, EngineStatus, FailureReason, HistoryEntry, SignalKind,
};
use dab_history::{HistoryFilter, HistoryStatistics, StatsWindow};

fn default_kind() -> SignalKind {
    SignalKind::Start
}

/// Command received from network clients (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ClientCommand {
    GetState,
    /// Inject an announcement start/stop, as the FIG 0/19 decoder would
    Signal {
        #[serde(rename = "type")]
        announcement_type: AnnouncementType,
        cluster: u8,
        target: String,
        /// Defaults to the type's standard priority
        #[serde(default)]
        priority: Option<i32>,
        #[serde(default = "default_kind")]
        kind: SignalKind,
    },
    ManualReturn,
    SetService {
        service: Option<String>,
    },
    SetConfig {
        config: AnnouncementConfig,
    },
    /// FIG 0/18 data for one service
    UpdateSupport {
        service: String,
        flags: u16,
        clusters: Vec<u8>,
    },
    /// Drop the FIG 0/18 entry of one service
    ClearSupport {
        service: String,
    },
    ClearAll,
    /// Outcome of a retune the receiver completed on its own
    RetuneResult {
        success: bool,
        /// Defaults to `tuner_fault` when `success` is false
        #[serde(default)]
        reason: Option<FailureReason>,
    },
    QueryHistory {
        #[serde(default)]
        filter: HistoryFilter,
        /// Keep only the newest `limit` matches
        #[serde(default)]
        limit: Option<usize>,
    },
    HistoryStats {
        #[serde(default)]
        window: StatsWindow,
    },
    ExportHistory {
        #[serde(default)]
        filter: HistoryFilter,
    },
    ClearHistory,
}

/// Envelope for client commands with optional authentication token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEnvelope {
    pub token: Option<String>,
    #[serde(flatten)]
    pub cmd: ClientCommand,
}

/// Response sent to network clients over TCP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<EngineStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<HistoryStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn with_state(state: EngineStatus) -> Self {
        Self {
            state: Some(state),
            ..Self::ok()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}
