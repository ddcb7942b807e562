// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use dab_core::{AnnouncementType, HistoryEntry, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsWindow {
    /// Since the ledger was created by this process
    #[default]
    Session,
    /// Everything still retained
    AllTime,
    Last24Hours,
    Last7Days,
}

impl StatsWindow {
    /// Earliest start time included, or `None` for no lower bound.
    pub fn start(
        self,
        session_started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Self::Session => Some(session_started_at),
            Self::AllTime => None,
            Self::Last24Hours => Some(now - Duration::hours(24)),
            Self::Last7Days => Some(now - Duration::days(7)),
        }
    }
}

impl fmt::Display for StatsWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Session => "this session",
            Self::AllTime => "all time",
            Self::Last24Hours => "last 24 hours",
            Self::Last7Days => "last 7 days",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStatistics {
    pub window: StatsWindow,
    pub total: usize,
    pub played: usize,
    pub skipped: usize,
    pub failed: usize,
    pub per_type: BTreeMap<AnnouncementType, usize>,
    /// Ties resolve to the more urgent type
    pub most_frequent: Option<AnnouncementType>,
    /// Mean on-air time of played announcements
    pub average_duration_secs: Option<f64>,
}

impl HistoryStatistics {
    pub fn compute<'a>(
        window: StatsWindow,
        since: Option<DateTime<Utc>>,
        entries: impl IntoIterator<Item = &'a HistoryEntry>,
    ) -> Self {
        let mut stats = Self {
            window,
            total: 0,
            played: 0,
            skipped: 0,
            failed: 0,
            per_type: BTreeMap::new(),
            most_frequent: None,
            average_duration_secs: None,
        };
        let mut played_ms: i64 = 0;
        let mut timed = 0usize;

        for entry in entries {
            if since.is_some_and(|s| entry.started_at < s) {
                continue;
            }
            stats.total += 1;
            *stats.per_type.entry(entry.announcement_type).or_default() += 1;
            match entry.outcome {
                Outcome::Played => {
                    stats.played += 1;
                    if let Some(d) = entry.duration() {
                        played_ms = played_ms.saturating_add(d.num_milliseconds());
                        timed += 1;
                    }
                }
                Outcome::Skipped => stats.skipped += 1,
                Outcome::Failed => stats.failed += 1,
            }
        }

        // BTreeMap iterates most urgent first; only a strictly higher count wins.
        let mut best: Option<(AnnouncementType, usize)> = None;
        for (&ty, &count) in &stats.per_type {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((ty, count));
            }
        }
        stats.most_frequent = best.map(|(ty, _)| ty);

        if timed > 0 {
            stats.average_duration_secs = Some(played_ms as f64 / 1000.0 / timed as f64);
        }
        stats
    }
}
