// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Announcement history ledger: retention, queries, statistics, CSV export
//! and JSON-Lines persistence.

pub mod export;
pub mod ledger;
pub mod query;
pub mod stats;
pub mod store;

pub use export::{ExportCancel, ExportError, CSV_HEADER};
pub use ledger::HistoryLedger;
pub use query::{HistoryFilter, HistoryView};
pub use stats::{HistoryStatistics, StatsWindow};
pub use store::{default_history_path, HistoryStore, StoreError};
