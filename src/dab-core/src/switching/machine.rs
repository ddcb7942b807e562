// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Announcement switching state machine.
//!
//! The machine is a plain value: it consumes [`SwitchEvent`]s and returns the
//! side effects ([`SwitchAction`]s) the owner must carry out. It performs no
//! I/O and never reads the clock itself, which keeps every transition
//! reproducible in tests.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::announcement::signal::{AnnouncementSignal, SignalKind};
use crate::announcement::support::ServiceAnnouncementSupport;
use crate::announcement::ChannelId;
use crate::config::AnnouncementConfig;
use crate::history::{EndReason, FailureReason, HistoryEntry};

use super::gate::{self, Verdict};
use super::ControlError;

/// Inputs that can drive a transition.
#[derive(Debug, Clone)]
pub enum SwitchEvent {
    /// Start or stop signal from the broadcast layer
    Signal(AnnouncementSignal),
    /// Maximum-duration timer fired for the given activation
    DeadlineReached { generation: u64 },
    /// Listener asked to go back to the interrupted service
    ManualReturn,
    /// Tuner confirmed the last requested retune
    RetuneSucceeded,
    /// Tuner could not complete a retune
    RetuneFailed(FailureReason),
    /// Ensemble changed or receiver reset: drop everything
    Abandon,
}

/// Side effects requested by a transition, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchAction {
    Retune(ChannelId),
    Record(HistoryEntry),
    ArmDeadline { generation: u64, after: Duration },
    DisarmDeadline,
}

/// An announcement currently on air.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAnnouncement {
    pub signal: AnnouncementSignal,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub origin: Option<ChannelId>,
    /// Activation counter; deadline timers carrying an older value are stale
    pub generation: u64,
}

impl ActiveAnnouncement {
    pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.started_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "data")]
pub enum SwitchState {
    /// Original service playing
    #[default]
    Idle,
    /// Gate check in progress; never observable between events
    Evaluating { signal: AnnouncementSignal },
    /// Announcement sub-channel tuned and playing
    Active(ActiveAnnouncement),
    /// Restoring the original service
    Returning {
        announcement: ActiveAnnouncement,
        reason: EndReason,
    },
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Evaluating { .. } => write!(f, "Evaluating"),
            Self::Active(_) => write!(f, "Active"),
            Self::Returning { .. } => write!(f, "Returning"),
        }
    }
}

impl SwitchState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// The announcement on air, only while Active.
    pub fn active(&self) -> Option<&ActiveAnnouncement> {
        match self {
            Self::Active(active) => Some(active),
            _ => None,
        }
    }

    /// Playback label for status displays.
    pub fn describe(&self) -> String {
        match self {
            Self::Idle => "Playing service".to_string(),
            Self::Evaluating { signal } => {
                format!("Checking {} announcement", signal.announcement_type)
            }
            Self::Active(active) => format!(
                "Playing {} announcement on {}",
                active.signal.announcement_type, active.signal.target
            ),
            Self::Returning { announcement, .. } => match &announcement.origin {
                Some(origin) => format!("Returning to {}", origin),
                None => "Returning to service".to_string(),
            },
        }
    }
}

/// Read-only inputs for one transition.
#[derive(Debug, Clone, Copy)]
pub struct SwitchContext<'a> {
    pub config: &'a AnnouncementConfig,
    /// Service the listener has selected
    pub origin: Option<&'a ChannelId>,
    /// FIG 0/18 entry of `origin`, when known
    pub origin_support: Option<&'a ServiceAnnouncementSupport>,
    pub now: DateTime<Utc>,
}

/// The switching state machine.
#[derive(Debug, Clone)]
pub struct SwitchMachine {
    state: SwitchState,
    transition_count: u64,
    generation: u64,
}

impl Default for SwitchMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchMachine {
    pub fn new() -> Self {
        Self {
            state: SwitchState::Idle,
            transition_count: 0,
            generation: 0,
        }
    }

    pub fn state(&self) -> &SwitchState {
        &self.state
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply one event and return the side effects to perform.
    ///
    /// Only [`SwitchEvent::ManualReturn`] can fail; every other event is
    /// either applied or ignored.
    pub fn process(
        &mut self,
        event: SwitchEvent,
        ctx: &SwitchContext<'_>,
    ) -> Result<Vec<SwitchAction>, ControlError> {
        let mut actions = Vec::new();
        match event {
            SwitchEvent::Signal(signal) => match signal.kind {
                SignalKind::Start => self.on_start(signal, ctx, &mut actions),
                SignalKind::Stop => self.on_stop(&signal, ctx, &mut actions),
            },
            SwitchEvent::DeadlineReached { generation } => {
                self.on_deadline(generation, &mut actions)
            }
            SwitchEvent::ManualReturn => self.on_manual_return(ctx, &mut actions)?,
            SwitchEvent::RetuneSucceeded => self.on_retune_succeeded(),
            SwitchEvent::RetuneFailed(reason) => self.on_retune_failed(reason, ctx, &mut actions),
            SwitchEvent::Abandon => self.on_abandon(ctx, &mut actions),
        }
        Ok(actions)
    }

    fn set_state(&mut self, state: SwitchState) {
        self.state = state;
        self.transition_count += 1;
    }

    fn on_start(
        &mut self,
        signal: AnnouncementSignal,
        ctx: &SwitchContext<'_>,
        actions: &mut Vec<SwitchAction>,
    ) {
        let (active_priority, origin) = match &self.state {
            SwitchState::Active(current) => {
                if current.signal.same_announcement(&signal) {
                    return;
                }
                (Some(current.signal.priority), current.origin.clone())
            }
            _ => (None, ctx.origin.cloned()),
        };

        let previous = std::mem::replace(
            &mut self.state,
            SwitchState::Evaluating {
                signal: signal.clone(),
            },
        );
        match gate::decide(&signal, ctx.config, active_priority, ctx.origin_support) {
            Verdict::Accept => {
                if let SwitchState::Active(current) = &previous {
                    info!(
                        "Pre-empting {} announcement on {} with {}",
                        current.signal.announcement_type,
                        current.signal.target,
                        signal.announcement_type
                    );
                    actions.push(SwitchAction::Record(HistoryEntry::played(
                        current,
                        ctx.now,
                        EndReason::Preempted,
                    )));
                    actions.push(SwitchAction::DisarmDeadline);
                }
                self.enter_active(signal, origin, ctx, actions);
            }
            Verdict::Reject(reason) => {
                self.state = previous;
                info!("Skipping {}: {}", signal, reason);
                let entry = match reason.as_failure() {
                    Some(failure) => HistoryEntry::failed(&signal, origin, ctx.now, None, failure),
                    None => HistoryEntry::skipped(&signal, origin, ctx.now, reason),
                };
                actions.push(SwitchAction::Record(entry));
            }
        }
    }

    fn enter_active(
        &mut self,
        signal: AnnouncementSignal,
        origin: Option<ChannelId>,
        ctx: &SwitchContext<'_>,
        actions: &mut Vec<SwitchAction>,
    ) {
        self.generation += 1;
        let target = signal.target.clone();
        let active = ActiveAnnouncement {
            deadline: deadline_after(ctx.now, ctx.config.max_duration_secs),
            started_at: ctx.now,
            origin,
            generation: self.generation,
            signal,
        };
        info!(
            "Switching to {} announcement on {} (cluster {}, priority {})",
            active.signal.announcement_type,
            target,
            active.signal.cluster,
            active.signal.priority
        );
        self.set_state(SwitchState::Active(active));
        actions.push(SwitchAction::ArmDeadline {
            generation: self.generation,
            after: ctx.config.max_duration(),
        });
        actions.push(SwitchAction::Retune(target));
    }

    fn on_stop(
        &mut self,
        signal: &AnnouncementSignal,
        ctx: &SwitchContext<'_>,
        actions: &mut Vec<SwitchAction>,
    ) {
        match &self.state {
            SwitchState::Active(active) if active.signal.cluster == signal.cluster => {
                self.begin_return(EndReason::Stopped, ctx.now, actions);
            }
            _ => debug!("Ignoring stop for inactive cluster {}", signal.cluster),
        }
    }

    fn on_deadline(&mut self, generation: u64, actions: &mut Vec<SwitchAction>) {
        match &self.state {
            SwitchState::Active(active) if active.generation == generation => {
                let deadline = active.deadline;
                info!("Announcement exceeded maximum duration, returning");
                self.begin_return(EndReason::MaxDurationExceeded, deadline, actions);
            }
            _ => debug!("Stale deadline timer (generation {})", generation),
        }
    }

    fn on_manual_return(
        &mut self,
        ctx: &SwitchContext<'_>,
        actions: &mut Vec<SwitchAction>,
    ) -> Result<(), ControlError> {
        if !self.state.is_active() {
            return Err(ControlError::NotActive);
        }
        if !ctx.config.allow_manual_return {
            return Err(ControlError::PermissionDenied);
        }
        self.begin_return(EndReason::Manual, ctx.now, actions);
        Ok(())
    }

    fn begin_return(
        &mut self,
        reason: EndReason,
        ended_at: DateTime<Utc>,
        actions: &mut Vec<SwitchAction>,
    ) {
        let SwitchState::Active(active) = &self.state else {
            return;
        };
        let active = active.clone();
        actions.push(SwitchAction::Record(HistoryEntry::played(
            &active, ended_at, reason,
        )));
        actions.push(SwitchAction::DisarmDeadline);
        match active.origin.clone() {
            Some(origin) => {
                self.set_state(SwitchState::Returning {
                    announcement: active,
                    reason,
                });
                actions.push(SwitchAction::Retune(origin));
            }
            None => self.set_state(SwitchState::Idle),
        }
    }

    fn on_retune_succeeded(&mut self) {
        if matches!(self.state, SwitchState::Returning { .. }) {
            self.set_state(SwitchState::Idle);
        }
    }

    fn on_retune_failed(
        &mut self,
        reason: FailureReason,
        ctx: &SwitchContext<'_>,
        actions: &mut Vec<SwitchAction>,
    ) {
        match &self.state {
            SwitchState::Active(active) => {
                let active = active.clone();
                warn!(
                    "Retune to {} failed: {}",
                    active.signal.target, reason
                );
                actions.push(SwitchAction::Record(HistoryEntry::failed(
                    &active.signal,
                    active.origin.clone(),
                    active.started_at,
                    Some(ctx.now),
                    reason,
                )));
                actions.push(SwitchAction::DisarmDeadline);
                // Best effort: get the listener back to something audible.
                match active.origin.clone() {
                    Some(origin) => {
                        self.set_state(SwitchState::Returning {
                            announcement: active,
                            reason: EndReason::RetuneFailed,
                        });
                        actions.push(SwitchAction::Retune(origin));
                    }
                    None => self.set_state(SwitchState::Idle),
                }
            }
            SwitchState::Returning { announcement, .. } => {
                warn!(
                    "Restoring {:?} failed: {}",
                    announcement.origin, reason
                );
                actions.push(SwitchAction::Record(HistoryEntry::failed(
                    &announcement.signal,
                    announcement.origin.clone(),
                    announcement.started_at,
                    Some(ctx.now),
                    reason,
                )));
                self.set_state(SwitchState::Idle);
            }
            _ => debug!("Retune failure while {}: {}", self.state, reason),
        }
    }

    fn on_abandon(&mut self, ctx: &SwitchContext<'_>, actions: &mut Vec<SwitchAction>) {
        match &self.state {
            SwitchState::Active(active) => {
                actions.push(SwitchAction::Record(HistoryEntry::played(
                    active,
                    ctx.now,
                    EndReason::Abandoned,
                )));
                actions.push(SwitchAction::DisarmDeadline);
                self.set_state(SwitchState::Idle);
            }
            SwitchState::Returning { .. } => self.set_state(SwitchState::Idle),
            _ => {}
        }
    }
}

fn deadline_after(start: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    chrono::Duration::try_seconds(secs)
        .and_then(|d| start.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announcement::AnnouncementType;
    use crate::history::Outcome;
    use crate::switching::gate::RejectReason;
    use chrono::TimeZone;

    fn config() -> AnnouncementConfig {
        AnnouncementConfig {
            enabled_types: [AnnouncementType::Traffic, AnnouncementType::Alarm]
                .into_iter()
                .collect(),
            priority_threshold: 5,
            max_duration_secs: 60,
            allow_manual_return: true,
            ..Default::default()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    struct Harness {
        machine: SwitchMachine,
        config: AnnouncementConfig,
        origin: ChannelId,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                machine: SwitchMachine::new(),
                config: config(),
                origin: ChannelId::from("P1"),
            }
        }

        fn run(&mut self, event: SwitchEvent, now: DateTime<Utc>) -> Vec<SwitchAction> {
            let ctx = SwitchContext {
                config: &self.config,
                origin: Some(&self.origin),
                origin_support: None,
                now,
            };
            self.machine.process(event, &ctx).unwrap()
        }
    }

    fn records(actions: &[SwitchAction]) -> Vec<&HistoryEntry> {
        actions
            .iter()
            .filter_map(|a| match a {
                SwitchAction::Record(entry) => Some(entry),
                _ => None,
            })
            .collect()
    }

    fn traffic(cluster: u8, priority: i32) -> AnnouncementSignal {
        AnnouncementSignal::start(AnnouncementType::Traffic, cluster, "T1", priority)
    }

    #[test]
    fn test_accept_then_stop() {
        let mut h = Harness::new();
        let actions = h.run(SwitchEvent::Signal(traffic(2, 7)), at(0));
        assert_eq!(
            actions,
            vec![
                SwitchAction::ArmDeadline {
                    generation: 1,
                    after: Duration::from_secs(60)
                },
                SwitchAction::Retune(ChannelId::from("T1")),
            ]
        );
        assert!(h.machine.state().is_active());
        assert!(h.run(SwitchEvent::RetuneSucceeded, at(0)).is_empty());

        let stop = AnnouncementSignal::stop(AnnouncementType::Traffic, 2, "T1");
        let actions = h.run(SwitchEvent::Signal(stop), at(10));
        let played = records(&actions);
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].outcome, Outcome::Played);
        assert_eq!(played[0].duration(), Some(chrono::Duration::seconds(10)));
        assert!(actions.contains(&SwitchAction::Retune(ChannelId::from("P1"))));
        assert!(matches!(h.machine.state(), SwitchState::Returning { .. }));

        h.run(SwitchEvent::RetuneSucceeded, at(10));
        assert!(h.machine.state().is_idle());
        assert_eq!(h.machine.transition_count(), 3);
    }

    #[test]
    fn test_rejected_signal_records_skip_without_retune() {
        let mut h = Harness::new();
        let weather = AnnouncementSignal::start(AnnouncementType::Weather, 2, "W1", 9);
        let actions = h.run(SwitchEvent::Signal(weather), at(0));
        assert_eq!(actions.len(), 1);
        let entry = records(&actions)[0];
        assert_eq!(entry.outcome, Outcome::Skipped);
        assert_eq!(entry.skip_reason, Some(RejectReason::TypeDisabled));
        assert!(h.machine.state().is_idle());
        assert_eq!(h.machine.transition_count(), 0);
    }

    #[test]
    fn test_stale_deadline_is_ignored() {
        let mut h = Harness::new();
        h.run(SwitchEvent::Signal(traffic(2, 7)), at(0));
        h.run(SwitchEvent::Signal(AnnouncementSignal::stop(AnnouncementType::Traffic, 2, "T1")), at(5));
        h.run(SwitchEvent::RetuneSucceeded, at(5));
        h.run(SwitchEvent::Signal(traffic(3, 7)), at(20));
        assert_eq!(h.machine.generation(), 2);

        assert!(h
            .run(SwitchEvent::DeadlineReached { generation: 1 }, at(60))
            .is_empty());
        assert!(h.machine.state().is_active());

        let actions = h.run(SwitchEvent::DeadlineReached { generation: 2 }, at(80));
        let entry = records(&actions)[0];
        assert_eq!(entry.end_reason, Some(EndReason::MaxDurationExceeded));
        assert_eq!(entry.ended_at, Some(at(80)));
    }

    #[test]
    fn test_higher_priority_preempts_without_idle() {
        let mut h = Harness::new();
        h.run(SwitchEvent::Signal(traffic(2, 7)), at(0));
        let alarm = AnnouncementSignal::start(AnnouncementType::Alarm, 4, "A1", 11);
        let actions = h.run(SwitchEvent::Signal(alarm), at(3));

        let ended = records(&actions);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].end_reason, Some(EndReason::Preempted));
        assert_eq!(ended[0].origin, Some(ChannelId::from("P1")));
        assert!(actions.contains(&SwitchAction::Retune(ChannelId::from("A1"))));

        let active = h.machine.state().active().unwrap();
        assert_eq!(active.signal.target, ChannelId::from("A1"));
        assert_eq!(active.origin, Some(ChannelId::from("P1")));
    }

    #[test]
    fn test_refresh_of_active_announcement_is_silent() {
        let mut h = Harness::new();
        h.run(SwitchEvent::Signal(traffic(2, 7)), at(0));
        assert!(h.run(SwitchEvent::Signal(traffic(2, 7)), at(1)).is_empty());
        assert_eq!(h.machine.generation(), 1);
    }

    #[test]
    fn test_manual_return_rules() {
        let mut h = Harness::new();
        let ctx = SwitchContext {
            config: &h.config,
            origin: Some(&h.origin),
            origin_support: None,
            now: at(0),
        };
        assert_eq!(
            h.machine.process(SwitchEvent::ManualReturn, &ctx),
            Err(ControlError::NotActive)
        );

        h.config.allow_manual_return = false;
        h.run(SwitchEvent::Signal(traffic(2, 7)), at(0));
        let ctx = SwitchContext {
            config: &h.config,
            origin: Some(&h.origin),
            origin_support: None,
            now: at(4),
        };
        assert_eq!(
            h.machine.process(SwitchEvent::ManualReturn, &ctx),
            Err(ControlError::PermissionDenied)
        );
        assert!(h.machine.state().is_active());
    }

    #[test]
    fn test_retune_failure_returns_to_idle() {
        let mut h = Harness::new();
        h.run(SwitchEvent::Signal(traffic(2, 7)), at(0));
        let actions = h.run(
            SwitchEvent::RetuneFailed(FailureReason::SubchannelNotFound),
            at(0),
        );
        let entry = records(&actions)[0];
        assert_eq!(entry.outcome, Outcome::Failed);
        assert_eq!(entry.failure, Some(FailureReason::SubchannelNotFound));
        assert!(matches!(
            h.machine.state(),
            SwitchState::Returning {
                reason: EndReason::RetuneFailed,
                ..
            }
        ));
        assert!(actions.contains(&SwitchAction::Retune(ChannelId::from("P1"))));

        assert!(h.run(SwitchEvent::RetuneSucceeded, at(0)).is_empty());
        assert!(h.machine.state().is_idle());
    }

    #[test]
    fn test_failed_restore_after_retune_failure_is_recorded() {
        let mut h = Harness::new();
        h.run(SwitchEvent::Signal(traffic(2, 7)), at(0));
        h.run(
            SwitchEvent::RetuneFailed(FailureReason::SubchannelNotFound),
            at(0),
        );
        let actions = h.run(
            SwitchEvent::RetuneFailed(FailureReason::SubchannelNotFound),
            at(1),
        );
        let failed = records(&actions);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].outcome, Outcome::Failed);
        assert_eq!(failed[0].origin, Some(ChannelId::from("P1")));
        assert!(h.machine.state().is_idle());
        assert!(!actions
            .iter()
            .any(|a| matches!(a, SwitchAction::Retune(_))));
    }
}
