//! Durable log storage
//!
//! Entries are appended as newline-delimited JSON to per-day files under one
//! directory per category (`<root>/<category>/<category>-<YYYY-MM-DD>.jsonl`).
//! Completed traces are written as standalone pretty-printed documents under
//! the traces directory. Retention is enforced by [`rotation`].

use crate::entry::{Category, LogEntry};
use crate::error::TelemetryResult;
use crate::trace::Trace;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub mod rotation;
pub use rotation::RotationReport;

/// File extension for newline-delimited entry logs
pub const LOG_EXT: &str = "jsonl";

/// Append-only store for log entries and trace documents
#[derive(Debug)]
pub struct LogStore {
    root: PathBuf,
    max_file_size: u64,
    max_files: usize,
}

impl LogStore {
    /// Create a store rooted at `root`, creating every category directory
    pub fn new(root: &Path, max_file_size: u64, max_files: usize) -> TelemetryResult<Self> {
        for category in Category::ALL {
            std::fs::create_dir_all(root.join(category.dir_name()))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            max_file_size,
            max_files,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    /// Directory holding one category's files
    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.dir_name())
    }

    /// The file receiving appends for `category` today
    pub fn current_file(&self, category: Category) -> PathBuf {
        let name = format!(
            "{}-{}.{}",
            category.dir_name(),
            Utc::now().format("%Y-%m-%d"),
            LOG_EXT
        );
        self.category_dir(category).join(name)
    }

    /// Append a batch of entries to the category's current file.
    /// Returns the number of lines written.
    pub fn append_batch(&self, category: Category, entries: &[LogEntry]) -> TelemetryResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let path = self.current_file(category);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        for entry in entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(entries.len())
    }

    /// Persist a completed trace as a pretty-printed standalone document
    pub fn write_trace_document(&self, trace: &Trace) -> TelemetryResult<PathBuf> {
        let path = self
            .category_dir(Category::Traces)
            .join(format!("trace-{}.json", trace.id));
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), trace)?;
        Ok(path)
    }

    /// All entry log files for one category, unordered
    pub fn log_files(&self, category: Category) -> TelemetryResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir_entry in std::fs::read_dir(self.category_dir(category))? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(LOG_EXT) {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// All entry log files across every category
    pub fn all_log_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for category in Category::ALL {
            match self.log_files(category) {
                Ok(mut batch) => files.append(&mut batch),
                Err(e) => {
                    tracing::warn!(category = category.dir_name(), error = %e,
                        "Skipping unreadable category directory");
                }
            }
        }
        files
    }
}
