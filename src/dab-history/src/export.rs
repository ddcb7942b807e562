// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! CSV export of history snapshots.

use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::SecondsFormat;
use thiserror::Error;

use dab_core::HistoryEntry;

use crate::query::HistoryView;

pub const CSV_HEADER: &str =
    "id,type,cluster,service,origin,priority,started_at,ended_at,duration_secs,outcome,reason";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no history entries match the filter")]
    NoData,
    #[error("failed to write export: {0}")]
    WriteError(#[from] io::Error),
    #[error("export cancelled")]
    Cancelled,
}

/// Cancellation flag shared between an export and whoever may abort it.
#[derive(Debug, Clone, Default)]
pub struct ExportCancel(Arc<AtomicBool>);

impl ExportCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Stream the matching entries of `view` to `writer`; returns the row count.
///
/// The cancel flag is checked before every row. A cancelled export may
/// leave a partial file behind; the ledger itself is never touched.
pub fn write_csv<W: Write>(
    view: &HistoryView,
    mut writer: W,
    cancel: Option<&ExportCancel>,
) -> Result<usize, ExportError> {
    if view.is_empty() {
        return Err(ExportError::NoData);
    }
    writeln!(writer, "{}", CSV_HEADER)?;
    let mut rows = 0;
    for entry in view.iter() {
        if cancel.is_some_and(ExportCancel::is_cancelled) {
            return Err(ExportError::Cancelled);
        }
        writeln!(writer, "{}", csv_row(entry))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

fn csv_row(entry: &HistoryEntry) -> String {
    let ended_at = entry
        .ended_at
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();
    let duration = entry
        .duration()
        .map(|d| d.num_seconds().to_string())
        .unwrap_or_default();
    let origin = entry
        .origin
        .as_ref()
        .map(|o| o.as_str())
        .unwrap_or_default();
    let reason = entry.reason_text().unwrap_or_default();
    format!(
        "{},{},{},{},{},{},{},{},{},{},{}",
        entry.id,
        entry.announcement_type.key(),
        entry.cluster,
        csv_field(entry.service.as_str()),
        csv_field(origin),
        entry.priority,
        entry.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ended_at,
        duration,
        entry.outcome,
        csv_field(&reason),
    )
}

/// Quote a field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::HistoryFilter;
    use chrono::{TimeZone, Utc};
    use dab_core::{AnnouncementSignal, AnnouncementType, ChannelId, RejectReason};

    fn view(filter: HistoryFilter) -> HistoryView {
        let at = Utc.with_ymd_and_hms(2026, 2, 10, 7, 30, 0).unwrap();
        let entry = HistoryEntry::skipped(
            &AnnouncementSignal::start(AnnouncementType::Traffic, 2, "Traffic, North", 3),
            Some(ChannelId::from("P1")),
            at,
            RejectReason::PriorityTooLow,
        );
        HistoryView::new(vec![Arc::new(entry)], filter)
    }

    #[test]
    fn test_writes_header_and_quoted_row() {
        let mut out = Vec::new();
        let rows = write_csv(&view(HistoryFilter::all()), &mut out, None).unwrap();
        assert_eq!(rows, 1);
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        let row = lines.next().unwrap();
        assert!(row.ends_with(
            ",traffic,2,\"Traffic, North\",P1,3,2026-02-10T07:30:00Z,,,skipped,priority too low"
        ));
    }

    #[test]
    fn test_empty_selection_is_no_data() {
        let filter = HistoryFilter::all().with_type(AnnouncementType::Weather);
        let err = write_csv(&view(filter), Vec::new(), None).unwrap_err();
        assert!(matches!(err, ExportError::NoData));
    }

    #[test]
    fn test_cancelled_export() {
        let cancel = ExportCancel::new();
        cancel.cancel();
        let err = write_csv(&view(HistoryFilter::all()), Vec::new(), Some(&cancel)).unwrap_err();
        assert!(matches!(err, ExportError::Cancelled));
    }

    #[test]
    fn test_csv_field_escapes_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
