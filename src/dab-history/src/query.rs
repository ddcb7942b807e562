// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dab_core::{AnnouncementType, HistoryEntry, Outcome};

/// Criteria for selecting history entries. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryFilter {
    #[serde(rename = "type")]
    pub announcement_type: Option<AnnouncementType>,
    /// Inclusive lower bound on the start time
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the start time
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the announcement or interrupted service
    pub service_search: Option<String>,
    pub outcome: Option<Outcome>,
}

impl HistoryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, ty: AnnouncementType) -> Self {
        self.announcement_type = Some(ty);
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.service_search = Some(text.into());
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if self
            .announcement_type
            .is_some_and(|ty| ty != entry.announcement_type)
        {
            return false;
        }
        if self.outcome.is_some_and(|o| o != entry.outcome) {
            return false;
        }
        if self.from.is_some_and(|from| entry.started_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| entry.started_at > to) {
            return false;
        }
        match self.service_search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                entry.service.as_str().to_lowercase().contains(&needle)
                    || entry
                        .origin
                        .as_ref()
                        .is_some_and(|o| o.as_str().to_lowercase().contains(&needle))
            }
        }
    }
}

/// Snapshot of the ledger taken at query time.
///
/// Appends made after the query are not visible. `iter` filters lazily and
/// can be called any number of times.
#[derive(Debug, Clone)]
pub struct HistoryView {
    entries: Arc<[Arc<HistoryEntry>]>,
    filter: HistoryFilter,
}

impl HistoryView {
    pub(crate) fn new(entries: Vec<Arc<HistoryEntry>>, filter: HistoryFilter) -> Self {
        Self {
            entries: entries.into(),
            filter,
        }
    }

    pub fn filter(&self) -> &HistoryFilter {
        &self.filter
    }

    /// Matching entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries
            .iter()
            .map(Arc::as_ref)
            .filter(move |entry| self.filter.matches(entry))
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dab_core::{AnnouncementSignal, ChannelId, RejectReason};

    fn entry(ty: AnnouncementType, target: &str, hour: u32) -> HistoryEntry {
        let at = Utc.with_ymd_and_hms(2026, 5, 4, hour, 0, 0).unwrap();
        HistoryEntry::skipped(
            &AnnouncementSignal::start(ty, 1, target, 5),
            Some(ChannelId::from("Radio Uno")),
            at,
            RejectReason::PriorityTooLow,
        )
    }

    #[test]
    fn test_filter_by_type_and_range() {
        let traffic = entry(AnnouncementType::Traffic, "T1", 8);
        let news = entry(AnnouncementType::News, "N1", 12);
        let filter = HistoryFilter::all().with_type(AnnouncementType::Traffic);
        assert!(filter.matches(&traffic));
        assert!(!filter.matches(&news));

        let morning = HistoryFilter::all().between(
            Utc.with_ymd_and_hms(2026, 5, 4, 7, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap(),
        );
        assert!(morning.matches(&traffic));
        assert!(!morning.matches(&news));
    }

    #[test]
    fn test_service_search_is_case_insensitive() {
        let traffic = entry(AnnouncementType::Traffic, "Traffic One", 8);
        assert!(HistoryFilter::all().search("traffic").matches(&traffic));
        assert!(HistoryFilter::all().search("RADIO uno").matches(&traffic));
        assert!(HistoryFilter::all().search("  ").matches(&traffic));
        assert!(!HistoryFilter::all().search("jazz").matches(&traffic));
    }

    #[test]
    fn test_view_is_restartable() {
        let view = HistoryView::new(
            vec![
                Arc::new(entry(AnnouncementType::Traffic, "T1", 8)),
                Arc::new(entry(AnnouncementType::News, "N1", 9)),
                Arc::new(entry(AnnouncementType::Traffic, "T2", 10)),
            ],
            HistoryFilter::all().with_type(AnnouncementType::Traffic),
        );
        let first: Vec<_> = view.iter().map(|e| e.service.clone()).collect();
        let second: Vec<_> = view.iter().map(|e| e.service.clone()).collect();
        assert_eq!(first, vec![ChannelId::from("T1"), ChannelId::from("T2")]);
        assert_eq!(first, second);
        assert_eq!(view.count(), 2);
    }
}
