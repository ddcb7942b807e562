// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-service announcement support (FIG 0/18 data).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::signal::AnnouncementSignal;
use super::{AnnouncementFlags, AnnouncementType, ChannelId};

/// Which announcement types and clusters a service takes part in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAnnouncementSupport {
    pub service: ChannelId,
    pub flags: AnnouncementFlags,
    pub clusters: Vec<u8>,
}

impl ServiceAnnouncementSupport {
    pub fn new(service: impl Into<ChannelId>, flags: AnnouncementFlags, clusters: Vec<u8>) -> Self {
        Self {
            service: service.into(),
            flags,
            clusters,
        }
    }

    pub fn supports_type(&self, ty: AnnouncementType) -> bool {
        self.flags.contains(ty)
    }

    pub fn in_cluster(&self, cluster: u8) -> bool {
        self.clusters.contains(&cluster)
    }

    /// Whether a signal may interrupt this service.
    pub fn accepts(&self, signal: &AnnouncementSignal) -> bool {
        self.in_cluster(signal.cluster) && self.supports_type(signal.announcement_type)
    }
}

/// Support data for every service in the current ensemble.
#[derive(Debug, Clone, Default)]
pub struct SupportRegistry {
    services: HashMap<ChannelId, ServiceAnnouncementSupport>,
}

impl SupportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `support.service`.
    pub fn update(&mut self, support: ServiceAnnouncementSupport) {
        self.services.insert(support.service.clone(), support);
    }

    pub fn remove(&mut self, service: &ChannelId) -> Option<ServiceAnnouncementSupport> {
        self.services.remove(service)
    }

    pub fn clear(&mut self) {
        self.services.clear();
    }

    pub fn get(&self, service: &ChannelId) -> Option<&ServiceAnnouncementSupport> {
        self.services.get(service)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Union of the flags advertised across the ensemble.
    pub fn ensemble_flags(&self) -> AnnouncementFlags {
        AnnouncementFlags(self.services.values().fold(0, |acc, s| acc | s.flags.0))
    }
}
