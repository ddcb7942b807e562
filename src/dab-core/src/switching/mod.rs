// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Announcement switching: gate policy, state machine, notifications and
//! the engine task that serialises every decision.

use thiserror::Error;

use crate::config::InvalidConfiguration;

pub mod engine;
pub mod events;
pub mod gate;
pub mod machine;
pub mod tuner;

pub use engine::{
    spawn_engine, EngineCommand, EngineHandle, EngineRequest, EngineSettings, EngineStatus,
    SwitchEngine,
};
pub use events::{ListenerId, SwitchEventEmitter, SwitchListener};
pub use gate::{decide, RejectReason, Verdict};
pub use machine::{
    ActiveAnnouncement, SwitchAction, SwitchContext, SwitchEvent, SwitchMachine, SwitchState,
};
pub use tuner::{TuneError, TuneFuture, Tuner};

/// Errors reported to callers of engine operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("manual return is not permitted by the current configuration")]
    PermissionDenied,
    #[error("no announcement is active")]
    NotActive,
    #[error("switching engine is not running")]
    EngineStopped,
    #[error(transparent)]
    Config(#[from] InvalidConfiguration),
}
