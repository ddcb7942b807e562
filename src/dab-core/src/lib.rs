// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod announcement;
pub mod config;
pub mod history;
pub mod switching;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use announcement::signal::{AnnouncementSignal, SignalKind, ALARM_CLUSTER};
pub use announcement::support::{ServiceAnnouncementSupport, SupportRegistry};
pub use announcement::{AnnouncementFlags, AnnouncementType, ChannelId};
pub use config::{AnnouncementConfig, InvalidConfiguration};
pub use history::{EndReason, FailureReason, HistoryEntry, HistorySink, Outcome};
pub use switching::engine::{
    spawn_engine, EngineHandle, EngineSettings, EngineStatus, SwitchEngine,
};
pub use switching::events::SwitchListener;
pub use switching::gate::{RejectReason, Verdict};
pub use switching::machine::{ActiveAnnouncement, SwitchState};
pub use switching::tuner::{TuneError, TuneFuture, Tuner};
pub use switching::ControlError;
