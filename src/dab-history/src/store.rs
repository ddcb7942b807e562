// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON-Lines persistence for the history ledger.
//!
//! One entry per line in insertion order. Appends go straight to the file;
//! [`HistoryStore::rewrite`] compacts it down to the retained entries.

use std::collections::{HashSet, VecDeque};
use std::fs::{self, create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, warn};

use dab_core::HistoryEntry;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history store '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("history store serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Default location under the platform data directory.
pub fn default_history_path() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("dab-rs").join("history.jsonl");
    }
    PathBuf::from("history.jsonl")
}

pub struct HistoryStore {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl HistoryStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let writer = Self::open_writer(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_writer(path: &Path) -> Result<BufWriter<File>, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;
        Ok(BufWriter::new(file))
    }

    /// Read back at most the newest `max_entries` entries.
    ///
    /// Lines that fail to parse are skipped with a warning; a repeated
    /// entry id keeps only its first line.
    pub fn load(&self, max_entries: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        let file = File::open(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        let mut seen = HashSet::new();
        let mut entries = VecDeque::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| StoreError::io(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(&line) {
                Ok(entry) => {
                    if !seen.insert(entry.id) {
                        debug!("Skipping repeated history entry {}", entry.id);
                        continue;
                    }
                    entries.push_back(entry);
                    if entries.len() > max_entries {
                        entries.pop_front();
                    }
                }
                Err(e) => warn!(
                    "Skipping corrupt history line {} in {}: {}",
                    idx + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(entries.into())
    }

    pub fn append(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        serde_json::to_writer(&mut *writer, entry)?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|e| StoreError::io(&self.path, e))
    }

    /// Replace the file contents with `entries`.
    pub fn rewrite<'a>(
        &self,
        entries: impl IntoIterator<Item = &'a HistoryEntry>,
    ) -> Result<(), StoreError> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let tmp = self.path.with_extension("jsonl.tmp");
        {
            let file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
            let mut out = BufWriter::new(file);
            for entry in entries {
                serde_json::to_writer(&mut out, entry)?;
                out.write_all(b"\n").map_err(|e| StoreError::io(&tmp, e))?;
            }
            out.flush().map_err(|e| StoreError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        *writer = Self::open_writer(&self.path)?;
        Ok(())
    }

    pub fn truncate(&self) -> Result<(), StoreError> {
        self.rewrite(std::iter::empty())
    }
}
