// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Switching event notifications.
//!
//! Observers register a [`SwitchListener`] with the engine and receive
//! transitions and history records as they happen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::history::HistoryEntry;

use super::machine::{ActiveAnnouncement, SwitchState};

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receives switching notifications. All methods default to no-ops.
///
/// Callbacks run on the engine task; keep them short.
pub trait SwitchListener: Send + Sync {
    /// The machine moved between states.
    fn on_state_change(&self, _old: &SwitchState, _new: &SwitchState) {}

    /// An announcement went on air.
    fn on_announcement_started(&self, _active: &ActiveAnnouncement) {}

    /// A history entry was produced.
    fn on_history_entry(&self, _entry: &HistoryEntry) {}
}

/// Registered listeners plus dispatch.
pub struct SwitchEventEmitter {
    listeners: Vec<(ListenerId, Arc<dyn SwitchListener>)>,
}

impl Default for SwitchEventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchEventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn register(&mut self, listener: Arc<dyn SwitchListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.push((id, listener));
        id
    }

    pub fn unregister(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn notify_state_change(&self, old: &SwitchState, new: &SwitchState) {
        for (_, listener) in &self.listeners {
            listener.on_state_change(old, new);
        }
        if let SwitchState::Active(active) = new {
            let restarted = old.active().map(|a| a.generation) != Some(active.generation);
            if restarted {
                for (_, listener) in &self.listeners {
                    listener.on_announcement_started(active);
                }
            }
        }
    }

    pub fn notify_history_entry(&self, entry: &HistoryEntry) {
        for (_, listener) in &self.listeners {
            listener.on_history_entry(entry);
        }
    }
}
