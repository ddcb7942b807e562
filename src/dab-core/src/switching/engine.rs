// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Switching engine task.
//!
//! One tokio task owns the [`SwitchMachine`] and drains a command queue in
//! FIFO order, so signals, timers, manual returns and configuration updates
//! are never evaluated concurrently. Callers talk to it through a cloneable
//! [`EngineHandle`] and observe it through a `watch` channel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::announcement::signal::AnnouncementSignal;
use crate::announcement::support::{ServiceAnnouncementSupport, SupportRegistry};
use crate::announcement::{AnnouncementFlags, ChannelId};
use crate::config::AnnouncementConfig;
use crate::history::{FailureReason, HistoryEntry, HistorySink, Outcome};

use super::events::{ListenerId, SwitchEventEmitter, SwitchListener};
use super::machine::{SwitchAction, SwitchContext, SwitchEvent, SwitchMachine, SwitchState};
use super::tuner::Tuner;
use super::ControlError;

/// Timers further out than this are clamped; they would never fire anyway.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Startup parameters for the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub config: AnnouncementConfig,
    /// Service selected when the engine starts
    pub service: Option<ChannelId>,
    /// Upper bound for a single retune; exceeding it counts as a failure
    pub retune_timeout: Duration,
    /// Capacity of the command queue
    pub queue_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            config: AnnouncementConfig::default(),
            service: None,
            retune_timeout: Duration::from_secs(5),
            queue_capacity: 64,
        }
    }
}

/// Snapshot published after every processed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: SwitchState,
    /// Playback label, e.g. "Playing Road Traffic announcement on T1"
    pub label: String,
    pub service: Option<ChannelId>,
    pub config: AnnouncementConfig,
    /// Announcement types advertised by the ensemble (FIG 0/18 union)
    pub ensemble_flags: AnnouncementFlags,
    pub transition_count: u64,
    /// Last skip or failure notice
    pub message: Option<String>,
}

#[derive(Debug)]
pub enum EngineCommand {
    Signal(AnnouncementSignal),
    SetConfig(AnnouncementConfig),
    ManualReturn,
    /// Asynchronous retune outcome reported by the receiver
    RetuneResult(Result<(), FailureReason>),
    SetService(Option<ChannelId>),
    UpdateSupport(ServiceAnnouncementSupport),
    ClearSupport(ChannelId),
    /// Ensemble change: drop support data and any announcement on air
    ClearAll,
    GetStatus,
}

/// Command plus the channel its result is sent back on.
#[derive(Debug)]
pub struct EngineRequest {
    pub cmd: EngineCommand,
    pub respond_to: oneshot::Sender<Result<EngineStatus, ControlError>>,
}

/// Maps tokio's monotonic clock onto wall time.
///
/// History timestamps are derived from the monotonic clock so that they
/// follow paused or advanced time in tests.
#[derive(Debug, Clone, Copy)]
struct EngineClock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl EngineClock {
    fn new() -> Self {
        Self {
            wall: Utc::now(),
            mono: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.mono);
        chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|d| self.wall.checked_add_signed(d))
            .unwrap_or(self.wall)
    }
}

pub struct SwitchEngine {
    machine: SwitchMachine,
    config: AnnouncementConfig,
    service: Option<ChannelId>,
    support: SupportRegistry,
    tuner: Arc<dyn Tuner>,
    sink: Arc<dyn HistorySink>,
    emitter: SwitchEventEmitter,
    clock: EngineClock,
    deadline: Option<(u64, Instant)>,
    retune_timeout: Duration,
    queue_capacity: usize,
    message: Option<String>,
    status_tx: watch::Sender<EngineStatus>,
}

impl SwitchEngine {
    pub fn new(
        settings: EngineSettings,
        tuner: Arc<dyn Tuner>,
        sink: Arc<dyn HistorySink>,
    ) -> Result<Self, ControlError> {
        settings.config.validate()?;
        sink.set_capacity(settings.config.history_capacity());
        let machine = SwitchMachine::new();
        let status = EngineStatus {
            state: SwitchState::Idle,
            label: SwitchState::Idle.describe(),
            service: settings.service.clone(),
            config: settings.config.clone(),
            ensemble_flags: AnnouncementFlags::NONE,
            transition_count: 0,
            message: None,
        };
        let (status_tx, _) = watch::channel(status);
        Ok(Self {
            machine,
            config: settings.config,
            service: settings.service,
            support: SupportRegistry::new(),
            tuner,
            sink,
            emitter: SwitchEventEmitter::new(),
            clock: EngineClock::new(),
            deadline: None,
            retune_timeout: settings.retune_timeout,
            queue_capacity: settings.queue_capacity.max(1),
            message: None,
            status_tx,
        })
    }

    /// Register an observer; must happen before the engine is spawned.
    pub fn register_listener(&mut self, listener: Arc<dyn SwitchListener>) -> ListenerId {
        self.emitter.register(listener)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.machine.state().clone(),
            label: self.machine.state().describe(),
            service: self.service.clone(),
            config: self.config.clone(),
            ensemble_flags: self.support.ensemble_flags(),
            transition_count: self.machine.transition_count(),
            message: self.message.clone(),
        }
    }

    fn publish(&self) -> EngineStatus {
        let status = self.status();
        self.status_tx.send_replace(status.clone());
        status
    }

    async fn execute(&mut self, cmd: EngineCommand) -> Result<EngineStatus, ControlError> {
        match cmd {
            EngineCommand::Signal(signal) => self.dispatch(SwitchEvent::Signal(signal)).await?,
            EngineCommand::SetConfig(config) => {
                config.validate()?;
                self.sink.set_capacity(config.history_capacity());
                info!(
                    "Announcement configuration updated ({} types, threshold {}, max {}s)",
                    config.enabled_types.len(),
                    config.priority_threshold,
                    config.max_duration_secs
                );
                self.config = config;
            }
            EngineCommand::ManualReturn => self.dispatch(SwitchEvent::ManualReturn).await?,
            EngineCommand::RetuneResult(Ok(())) => {
                self.dispatch(SwitchEvent::RetuneSucceeded).await?
            }
            EngineCommand::RetuneResult(Err(reason)) => {
                self.dispatch(SwitchEvent::RetuneFailed(reason)).await?
            }
            EngineCommand::SetService(service) => {
                info!("Service selected: {:?}", service);
                self.service = service;
            }
            EngineCommand::UpdateSupport(support) => {
                debug!("Support update for {}: {:?}", support.service, support.clusters);
                self.support.update(support);
            }
            EngineCommand::ClearSupport(service) => {
                self.support.remove(&service);
            }
            EngineCommand::ClearAll => {
                info!("Clearing announcement data");
                self.support.clear();
                self.service = None;
                self.message = None;
                self.dispatch(SwitchEvent::Abandon).await?;
            }
            EngineCommand::GetStatus => {}
        }
        Ok(self.publish())
    }

    /// Run one event and every follow-up it causes within the same cycle.
    async fn dispatch(&mut self, event: SwitchEvent) -> Result<(), ControlError> {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let old = self.machine.state().clone();
            let before = self.machine.transition_count();
            let ctx = SwitchContext {
                config: &self.config,
                origin: self.service.as_ref(),
                origin_support: self.service.as_ref().and_then(|s| self.support.get(s)),
                now: self.clock.now(),
            };
            let actions = self.machine.process(event, &ctx)?;
            if self.machine.transition_count() != before {
                self.emitter
                    .notify_state_change(&old, self.machine.state());
            }

            for action in actions {
                match action {
                    SwitchAction::Record(entry) => self.record(entry),
                    SwitchAction::ArmDeadline { generation, after } => {
                        let now = Instant::now();
                        let at = now
                            .checked_add(after.min(FAR_FUTURE))
                            .unwrap_or(now);
                        self.deadline = Some((generation, at));
                    }
                    SwitchAction::DisarmDeadline => self.deadline = None,
                    SwitchAction::Retune(channel) => queue.push_back(self.retune(&channel).await),
                }
            }
        }
        Ok(())
    }

    async fn retune(&self, channel: &ChannelId) -> SwitchEvent {
        info!("Retuning to {}", channel);
        match time::timeout(self.retune_timeout, self.tuner.retune(channel)).await {
            Ok(Ok(())) => SwitchEvent::RetuneSucceeded,
            Ok(Err(e)) => {
                warn!("Retune to {} failed: {}", channel, e);
                SwitchEvent::RetuneFailed(e.reason())
            }
            Err(_) => {
                warn!(
                    "Retune to {} timed out after {:?}",
                    channel, self.retune_timeout
                );
                SwitchEvent::RetuneFailed(FailureReason::RetuneTimeout)
            }
        }
    }

    fn record(&mut self, entry: HistoryEntry) {
        match entry.outcome {
            Outcome::Played => {}
            Outcome::Skipped | Outcome::Failed => {
                self.message = Some(format!(
                    "{} announcement {}: {}",
                    entry.announcement_type,
                    entry.outcome,
                    entry.reason_text().unwrap_or_default()
                ));
            }
        }
        self.emitter.notify_history_entry(&entry);
        self.sink.record(entry);
    }

    /// Drain commands until every handle is dropped.
    pub async fn run(mut self, mut rx: mpsc::Receiver<EngineRequest>) {
        info!("Switching engine started");
        self.publish();
        loop {
            tokio::select! {
                generation = wait_deadline(self.deadline) => {
                    self.deadline = None;
                    if let Err(e) = self.dispatch(SwitchEvent::DeadlineReached { generation }).await {
                        warn!("Deadline handling failed: {}", e);
                    }
                    self.publish();
                }
                maybe_req = rx.recv() => {
                    let Some(EngineRequest { cmd, respond_to }) = maybe_req else { break; };
                    let label = format!("{:?}", cmd);
                    let result = self.execute(cmd).await;
                    if let Err(e) = &result {
                        debug!("Engine command {} rejected: {}", label, e);
                    }
                    let _ = respond_to.send(result);
                }
            }
        }

        if let Err(e) = self.dispatch(SwitchEvent::Abandon).await {
            warn!("Shutdown cleanup failed: {}", e);
        }
        self.publish();
        info!("Switching engine shutting down (channel closed)");
    }
}

async fn wait_deadline(deadline: Option<(u64, Instant)>) -> u64 {
    match deadline {
        Some((generation, at)) => {
            time::sleep_until(at).await;
            generation
        }
        None => std::future::pending().await,
    }
}

/// Spawn the engine on the current runtime.
pub fn spawn_engine(engine: SwitchEngine) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(engine.queue_capacity);
    let handle = EngineHandle {
        tx,
        status_rx: engine.status_tx.subscribe(),
    };
    let task = tokio::spawn(engine.run(rx));
    (handle, task)
}

/// Cloneable access to a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    status_rx: watch::Receiver<EngineStatus>,
}

impl EngineHandle {
    async fn request(&self, cmd: EngineCommand) -> Result<EngineStatus, ControlError> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest { cmd, respond_to })
            .await
            .map_err(|_| ControlError::EngineStopped)?;
        rx.await.map_err(|_| ControlError::EngineStopped)?
    }

    pub async fn on_announcement_signal(
        &self,
        signal: AnnouncementSignal,
    ) -> Result<EngineStatus, ControlError> {
        self.request(EngineCommand::Signal(signal)).await
    }

    /// Replace the policy; an invalid value is rejected and the old one kept.
    pub async fn on_configuration_changed(
        &self,
        config: AnnouncementConfig,
    ) -> Result<EngineStatus, ControlError> {
        self.request(EngineCommand::SetConfig(config)).await
    }

    pub async fn request_manual_return(&self) -> Result<EngineStatus, ControlError> {
        self.request(EngineCommand::ManualReturn).await
    }

    pub async fn retune_result(
        &self,
        result: Result<(), FailureReason>,
    ) -> Result<EngineStatus, ControlError> {
        self.request(EngineCommand::RetuneResult(result)).await
    }

    pub async fn set_service(
        &self,
        service: Option<ChannelId>,
    ) -> Result<EngineStatus, ControlError> {
        self.request(EngineCommand::SetService(service)).await
    }

    pub async fn update_service_support(
        &self,
        support: ServiceAnnouncementSupport,
    ) -> Result<EngineStatus, ControlError> {
        self.request(EngineCommand::UpdateSupport(support)).await
    }

    pub async fn clear_service_support(
        &self,
        service: ChannelId,
    ) -> Result<EngineStatus, ControlError> {
        self.request(EngineCommand::ClearSupport(service)).await
    }

    pub async fn clear_all(&self) -> Result<EngineStatus, ControlError> {
        self.request(EngineCommand::ClearAll).await
    }

    /// Round-trip through the queue; reflects every earlier command.
    pub async fn refresh(&self) -> Result<EngineStatus, ControlError> {
        self.request(EngineCommand::GetStatus).await
    }

    /// Latest published status without queueing.
    pub fn status(&self) -> EngineStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announcement::AnnouncementType;
    use crate::switching::tuner::{TuneError, TuneFuture};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTuner {
        tuned: Mutex<Vec<ChannelId>>,
        missing: Vec<ChannelId>,
        delay: Option<Duration>,
    }

    impl Tuner for RecordingTuner {
        fn retune<'a>(&'a self, channel: &'a ChannelId) -> TuneFuture<'a> {
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    time::sleep(delay).await;
                }
                if self.missing.contains(channel) {
                    return Err(TuneError::SubchannelNotFound(channel.clone()));
                }
                self.tuned.lock().unwrap().push(channel.clone());
                Ok(())
            })
        }
    }

    #[derive(Default)]
    struct VecSink {
        entries: Mutex<Vec<HistoryEntry>>,
        capacity: Mutex<usize>,
    }

    impl HistorySink for VecSink {
        fn record(&self, entry: HistoryEntry) {
            self.entries.lock().unwrap().push(entry);
        }

        fn set_capacity(&self, max_entries: usize) {
            *self.capacity.lock().unwrap() = max_entries;
        }
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            config: AnnouncementConfig {
                enabled_types: [AnnouncementType::Traffic].into_iter().collect(),
                priority_threshold: 5,
                max_duration_secs: 30,
                ..Default::default()
            },
            service: Some(ChannelId::from("P1")),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_forces_return() {
        let tuner = Arc::new(RecordingTuner::default());
        let sink = Arc::new(VecSink::default());
        let engine = SwitchEngine::new(settings(), tuner.clone(), sink.clone()).unwrap();
        let (handle, _task) = spawn_engine(engine);

        let status = handle
            .on_announcement_signal(AnnouncementSignal::start(AnnouncementType::Traffic, 2, "T1", 7))
            .await
            .unwrap();
        assert!(status.state.is_active());

        time::sleep(Duration::from_secs(31)).await;
        let status = handle.refresh().await.unwrap();
        assert!(status.state.is_idle());

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].duration(), Some(chrono::Duration::seconds(30)));
        assert_eq!(
            *tuner.tuned.lock().unwrap(),
            vec![ChannelId::from("T1"), ChannelId::from("P1")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_keeps_previous() {
        let sink = Arc::new(VecSink::default());
        let engine =
            SwitchEngine::new(settings(), Arc::new(RecordingTuner::default()), sink.clone()).unwrap();
        let (handle, _task) = spawn_engine(engine);

        let bad = AnnouncementConfig {
            max_history_entries: 0,
            ..Default::default()
        };
        let err = handle.on_configuration_changed(bad).await.unwrap_err();
        assert!(matches!(err, ControlError::Config(_)));
        assert_eq!(handle.refresh().await.unwrap().config, settings().config);

        let smaller = AnnouncementConfig {
            max_history_entries: 10,
            ..Default::default()
        };
        handle.on_configuration_changed(smaller).await.unwrap();
        assert_eq!(*sink.capacity.lock().unwrap(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_subchannel_is_failure() {
        let tuner = Arc::new(RecordingTuner {
            missing: vec![ChannelId::from("T9")],
            ..Default::default()
        });
        let sink = Arc::new(VecSink::default());
        let engine = SwitchEngine::new(settings(), tuner.clone(), sink.clone()).unwrap();
        let (handle, _task) = spawn_engine(engine);

        let status = handle
            .on_announcement_signal(AnnouncementSignal::start(AnnouncementType::Traffic, 2, "T9", 7))
            .await
            .unwrap();
        assert!(status.state.is_idle());
        assert!(status.message.unwrap().contains("failed"));

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, Outcome::Failed);
        assert_eq!(entries[0].failure, Some(FailureReason::SubchannelNotFound));
        assert_eq!(*tuner.tuned.lock().unwrap(), vec![ChannelId::from("P1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_restore_records_second_failure() {
        let tuner = Arc::new(RecordingTuner {
            missing: vec![ChannelId::from("T9"), ChannelId::from("P1")],
            ..Default::default()
        });
        let sink = Arc::new(VecSink::default());
        let engine = SwitchEngine::new(settings(), tuner.clone(), sink.clone()).unwrap();
        let (handle, _task) = spawn_engine(engine);

        let status = handle
            .on_announcement_signal(AnnouncementSignal::start(AnnouncementType::Traffic, 2, "T9", 7))
            .await
            .unwrap();
        assert!(status.state.is_idle());

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.outcome == Outcome::Failed));
        assert_eq!(entries[1].failure, Some(FailureReason::SubchannelNotFound));
        assert_eq!(entries[1].origin, Some(ChannelId::from("P1")));
        assert!(tuner.tuned.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tuner_times_out() {
        let tuner = Arc::new(RecordingTuner {
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let sink = Arc::new(VecSink::default());
        let engine = SwitchEngine::new(
            EngineSettings {
                retune_timeout: Duration::from_secs(2),
                ..settings()
            },
            tuner,
            sink.clone(),
        )
        .unwrap();
        let (handle, _task) = spawn_engine(engine);

        let status = handle
            .on_announcement_signal(AnnouncementSignal::start(AnnouncementType::Traffic, 2, "T1", 7))
            .await
            .unwrap();
        assert!(status.state.is_idle());
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries[0].failure, Some(FailureReason::RetuneTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all_abandons_active() {
        let sink = Arc::new(VecSink::default());
        let engine =
            SwitchEngine::new(settings(), Arc::new(RecordingTuner::default()), sink.clone()).unwrap();
        let (handle, _task) = spawn_engine(engine);

        handle
            .on_announcement_signal(AnnouncementSignal::start(AnnouncementType::Traffic, 2, "T1", 7))
            .await
            .unwrap();
        let status = handle.clear_all().await.unwrap();
        assert!(status.state.is_idle());
        assert_eq!(status.service, None);
        assert_eq!(
            sink.entries.lock().unwrap()[0].end_reason,
            Some(crate::history::EndReason::Abandoned)
        );
    }
}
