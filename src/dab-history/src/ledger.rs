// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bounded, append-only announcement history.
//!
//! Readers take `Arc` snapshots under a short read lock, so queries,
//! statistics and exports never block the engine for longer than a copy of
//! the entry pointers.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use dab_core::{HistoryEntry, HistorySink};

use crate::export::{self, ExportCancel, ExportError};
use crate::query::{HistoryFilter, HistoryView};
use crate::stats::{HistoryStatistics, StatsWindow};
use crate::store::{HistoryStore, StoreError};

struct LedgerInner {
    entries: VecDeque<Arc<HistoryEntry>>,
    capacity: usize,
    /// Entries dropped from memory but still present in the store file
    stale_in_store: usize,
}

pub struct HistoryLedger {
    inner: RwLock<LedgerInner>,
    session_started_at: DateTime<Utc>,
    store: Option<HistoryStore>,
}

impl HistoryLedger {
    /// In-memory ledger holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(LedgerInner {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
                stale_in_store: 0,
            }),
            session_started_at: Utc::now(),
            store: None,
        }
    }

    /// Ledger backed by `store`, preloaded with its newest entries.
    pub fn with_store(store: HistoryStore, capacity: usize) -> Result<Self, StoreError> {
        let loaded = store.load(capacity.max(1))?;
        info!(
            "Loaded {} history entries from {}",
            loaded.len(),
            store.path().display()
        );
        let mut ledger = Self::new(capacity);
        {
            let inner = ledger.inner.get_mut().unwrap_or_else(|e| e.into_inner());
            inner.entries.extend(loaded.into_iter().map(Arc::new));
        }
        // Drop lines beyond capacity left over from an earlier run.
        store.rewrite(ledger.read().entries.iter().map(Arc::as_ref))?;
        ledger.store = Some(store);
        Ok(ledger)
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn session_started_at(&self) -> DateTime<Utc> {
        self.session_started_at
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.read().capacity
    }

    /// Append one entry, evicting the oldest once the cap is reached.
    ///
    /// The file write happens after the lock is released, so readers never
    /// wait on disk I/O. A compaction racing in between may leave the line
    /// twice in the file; [`HistoryStore::load`] drops the repeat.
    pub fn append(&self, entry: HistoryEntry) {
        let entry = Arc::new(entry);
        let compact = {
            let mut inner = self.write();
            inner.entries.push_back(Arc::clone(&entry));
            let evicted = evict(&mut inner);
            inner.stale_in_store += evicted;
            inner.stale_in_store > inner.capacity
        };
        if let Some(store) = &self.store {
            if let Err(e) = store.append(&entry) {
                warn!("History persistence failed: {}", e);
            }
        }
        if compact {
            self.compact();
        }
    }

    /// Change the cap; shrinking evicts oldest entries immediately.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        let evicted = {
            let mut inner = self.write();
            if inner.capacity == capacity {
                return;
            }
            inner.capacity = capacity;
            let evicted = evict(&mut inner);
            inner.stale_in_store += evicted;
            evicted
        };
        debug!("History capacity set to {} ({} evicted)", capacity, evicted);
        if evicted > 0 {
            self.compact();
        }
    }

    /// Remove every entry, in memory and on disk. Irreversible.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.write();
        inner.entries.clear();
        inner.stale_in_store = 0;
        if let Some(store) = &self.store {
            store.truncate()?;
        }
        info!("History cleared");
        Ok(())
    }

    /// Rewrite the store so it holds exactly the retained entries.
    pub fn persist(&self) -> Result<(), StoreError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let mut inner = self.write();
        store.rewrite(inner.entries.iter().map(Arc::as_ref))?;
        inner.stale_in_store = 0;
        Ok(())
    }

    fn compact(&self) {
        if let Err(e) = self.persist() {
            warn!("History compaction failed: {}", e);
        }
    }

    fn snapshot(&self) -> Vec<Arc<HistoryEntry>> {
        self.read().entries.iter().cloned().collect()
    }

    /// Chronological view of the entries matching `filter`.
    pub fn query(&self, filter: HistoryFilter) -> HistoryView {
        HistoryView::new(self.snapshot(), filter)
    }

    pub fn statistics(&self, window: StatsWindow, now: DateTime<Utc>) -> HistoryStatistics {
        let since = window.start(self.session_started_at, now);
        let snapshot = self.snapshot();
        HistoryStatistics::compute(window, since, snapshot.iter().map(Arc::as_ref))
    }

    pub fn export_csv(&self, filter: HistoryFilter) -> Result<Vec<u8>, ExportError> {
        let mut out = Vec::new();
        export::write_csv(&self.query(filter), &mut out, None)?;
        Ok(out)
    }

    /// Stream a CSV export to `writer`, honouring `cancel`.
    pub fn write_csv<W: Write>(
        &self,
        filter: HistoryFilter,
        writer: W,
        cancel: Option<&ExportCancel>,
    ) -> Result<usize, ExportError> {
        export::write_csv(&self.query(filter), writer, cancel)
    }
}

fn evict(inner: &mut LedgerInner) -> usize {
    let mut evicted = 0;
    while inner.entries.len() > inner.capacity {
        inner.entries.pop_front();
        evicted += 1;
    }
    evicted
}

impl HistorySink for HistoryLedger {
    fn record(&self, entry: HistoryEntry) {
        self.append(entry);
    }

    fn set_capacity(&self, max_entries: usize) {
        HistoryLedger::set_capacity(self, max_entries);
    }
}
