// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated DAB front end used until a hardware backend is attached.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info};

use dab_core::{ChannelId, TuneError, TuneFuture, Tuner};

use crate::config::TunerConfig;

pub struct SimulatedTuner {
    /// Empty means every sub-channel is reachable.
    subchannels: HashSet<ChannelId>,
    unsupported: HashSet<ChannelId>,
    latency: Duration,
    current: Mutex<Option<ChannelId>>,
}

impl SimulatedTuner {
    pub fn new(
        subchannels: impl IntoIterator<Item = ChannelId>,
        unsupported: impl IntoIterator<Item = ChannelId>,
        latency: Duration,
    ) -> Self {
        Self {
            subchannels: subchannels.into_iter().collect(),
            unsupported: unsupported.into_iter().collect(),
            latency,
            current: Mutex::new(None),
        }
    }

    pub fn from_config(cfg: &TunerConfig) -> Self {
        let tuner = Self::new(
            cfg.subchannels.iter().map(ChannelId::new),
            cfg.unsupported_services.iter().map(ChannelId::new),
            cfg.latency(),
        );
        if let Some(initial) = &cfg.initial_service {
            tuner.set_current(Some(ChannelId::new(initial)));
        }
        tuner
    }

    /// Sub-channel audio is currently decoded from.
    pub fn current(&self) -> Option<ChannelId> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }

    fn set_current(&self, channel: Option<ChannelId>) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = channel;
        }
    }

    fn check(&self, channel: &ChannelId) -> Result<(), TuneError> {
        if self.unsupported.contains(channel) {
            return Err(TuneError::ServiceUnsupported(channel.clone()));
        }
        if !self.subchannels.is_empty() && !self.subchannels.contains(channel) {
            return Err(TuneError::SubchannelNotFound(channel.clone()));
        }
        Ok(())
    }
}

impl Tuner for SimulatedTuner {
    fn retune<'a>(&'a self, channel: &'a ChannelId) -> TuneFuture<'a> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                debug!("Simulating {:?} retune latency", self.latency);
                tokio::time::sleep(self.latency).await;
            }
            self.check(channel)?;
            self.set_current(Some(channel.clone()));
            info!("Now decoding sub-channel {}", channel);
            Ok(())
        })
    }
}
