//! Log file rotation
//!
//! Runs on a slow cadence per category directory: files beyond the retention
//! count are deleted oldest-first (by modification time), and remaining files
//! over the size limit are renamed with an archival timestamp so a fresh file
//! receives further appends. A failed pass is abandoned and retried on the
//! next cycle.

use super::{LogStore, LOG_EXT};
use crate::entry::Category;
use crate::error::TelemetryResult;
use chrono::Utc;
use std::path::PathBuf;
use std::time::SystemTime;

/// Marker inserted into archived file names; archived files are never
/// re-archived but still count toward retention
const ARCHIVE_MARKER: &str = ".archive.";

/// Outcome of one rotation pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RotationReport {
    pub deleted: usize,
    pub archived: usize,
}

impl LogStore {
    /// Rotate every category directory, accumulating one report
    pub fn rotate(&self) -> TelemetryResult<RotationReport> {
        let mut report = RotationReport::default();
        for category in Category::ALL {
            let pass = self.rotate_category(category)?;
            report.deleted += pass.deleted;
            report.archived += pass.archived;
        }
        Ok(report)
    }

    /// Rotate one category directory
    pub fn rotate_category(&self, category: Category) -> TelemetryResult<RotationReport> {
        let mut report = RotationReport::default();

        let mut files: Vec<(PathBuf, SystemTime, u64)> = Vec::new();
        for path in self.log_files(category)? {
            let meta = std::fs::metadata(&path)?;
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((path, mtime, meta.len()));
        }

        // Most recently modified first; retention keeps the head
        files.sort_by(|a, b| b.1.cmp(&a.1));

        if files.len() > self.max_files() {
            for (path, _, _) in files.split_off(self.max_files()) {
                std::fs::remove_file(&path)?;
                report.deleted += 1;
            }
        }

        for (path, _, size) in files {
            if size <= self.max_file_size() {
                continue;
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if name.contains(ARCHIVE_MARKER) {
                continue;
            }
            let stem = name.strip_suffix(&format!(".{LOG_EXT}")).unwrap_or(name);
            let archived = path.with_file_name(format!(
                "{stem}{ARCHIVE_MARKER}{}.{LOG_EXT}",
                Utc::now().format("%Y%m%d%H%M%S")
            ));
            std::fs::rename(&path, &archived)?;
            report.archived += 1;
        }

        Ok(report)
    }
}
