//! Attendance log: a CSV file holding at most one row per student per day.

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::Label;

pub const HEADER: [&str; 4] = ["Name", "Date", "Time", "Status"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttendanceRecord {
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    /// A `Present` row at `at`, truncated to whole seconds.
    pub fn present(name: impl Into<String>, at: NaiveDateTime) -> Self {
        let t = at.time();
        Self {
            name: name.into(),
            date: at.date(),
            time: NaiveTime::from_hms_opt(t.hour(), t.minute(), t.second()).unwrap_or(t),
            status: AttendanceStatus::Present,
        }
    }
}

/// Result of a retention cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub removed: usize,
    pub kept: usize,
    pub backup: Option<PathBuf>,
}

/// The persisted log. Every update reads the whole file and rewrites it.
#[derive(Debug, Clone)]
pub struct AttendanceLog {
    path: PathBuf,
}

impl AttendanceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the file with just the header if it does not exist.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        self.write_all(&[])
    }

    /// All rows. A missing or empty file has none.
    pub fn read_all(&self) -> Result<Vec<AttendanceRecord>> {
        let has_data = fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false);
        if !has_data {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let mut records = Vec::new();
        for row in reader.deserialize() {
            let record: AttendanceRecord =
                row.with_context(|| format!("Malformed row in {}", self.path.display()))?;
            records.push(record);
        }
        Ok(records)
    }

    pub fn write_all(&self, records: &[AttendanceRecord]) -> Result<()> {
        write_records(&self.path, records)
    }

    pub fn contains(&self, name: &str, date: NaiveDate) -> Result<bool> {
        Ok(self
            .read_all()?
            .iter()
            .any(|r| r.name == name && r.date == date))
    }

    /// Appends `record` unless a row for the same name and date exists.
    /// Returns whether a row was written.
    pub fn insert_if_absent(&self, record: AttendanceRecord) -> Result<bool> {
        let mut records = self.read_all()?;
        if records
            .iter()
            .any(|r| r.name == record.name && r.date == record.date)
        {
            return Ok(false);
        }
        records.push(record);
        self.write_all(&records)?;
        Ok(true)
    }

    /// Drops rows older than `days_to_keep` days before `today`. When rows are
    /// removed the previous log is first copied to
    /// `attendance_backup_<YYYYMMDD>.csv` in the same folder.
    pub fn cleanup(&self, today: NaiveDate, days_to_keep: u32) -> Result<CleanupOutcome> {
        let records = self.read_all()?;
        let cutoff = today
            .checked_sub_days(Days::new(days_to_keep as u64))
            .unwrap_or(NaiveDate::MIN);
        let recent: Vec<AttendanceRecord> =
            records.iter().filter(|r| r.date >= cutoff).cloned().collect();

        if recent.len() == records.len() {
            return Ok(CleanupOutcome {
                removed: 0,
                kept: records.len(),
                backup: None,
            });
        }

        let backup_name = format!("attendance_backup_{}.csv", today.format("%Y%m%d"));
        let backup = match self.path.parent() {
            Some(dir) => dir.join(backup_name),
            None => PathBuf::from(backup_name),
        };
        write_records(&backup, &records)?;
        self.write_all(&recent)?;

        let removed = records.len() - recent.len();
        info!("Cleaned up {} old records, backup saved to {}", removed, backup.display());
        Ok(CleanupOutcome {
            removed,
            kept: recent.len(),
            backup: Some(backup),
        })
    }
}

fn write_records(path: &Path, records: &[AttendanceRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    // Written by hand so an empty log still gets a header.
    writer.write_record(HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// First-sighting-per-day logger. Keeps an in-process set of
/// (name, day) keys in front of the persisted log, which stays the source
/// of truth across restarts.
pub struct AttendanceLogger {
    log: AttendanceLog,
    seen: HashSet<(String, NaiveDate)>,
}

impl AttendanceLogger {
    pub fn new(log: AttendanceLog) -> Self {
        Self {
            log,
            seen: HashSet::new(),
        }
    }

    /// Records a known face as present at `at` if it has no row for that day
    /// yet. Returns whether a row was written. Failures are logged and the
    /// sighting is dropped.
    pub fn log(&mut self, label: &Label, at: NaiveDateTime) -> bool {
        let Label::Known(name) = label else {
            return false;
        };
        let key = (name.to_string(), at.date());
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key);

        match self.log.insert_if_absent(AttendanceRecord::present(name.as_str(), at)) {
            Ok(true) => {
                info!("Attendance logged for {} at {}", name, at.format("%H:%M:%S"));
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Error logging attendance for {}: {:#}", name, e);
                false
            }
        }
    }
}
