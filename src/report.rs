//! Summaries computed from the attendance log.

use anyhow::Result;
use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use crate::attendance::{AttendanceLog, AttendanceRecord};
use crate::config::AppConfig;
use crate::dataset;

const RECENT_DAYS: u64 = 7;
const RECENT_LIMIT: usize = 10;
pub const DEFAULT_REPORT_DAYS: u64 = 30;

/// Today's attendance at a glance.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceStats {
    pub total_students: usize,
    pub present_today: usize,
    pub absent_today: usize,
    /// Percentage of registered students present today.
    pub attendance_rate: f32,
    pub late_today: usize,
    pub today_records: Vec<AttendanceRecord>,
    /// The last rows dated within the past week, oldest first.
    pub recent_records: Vec<AttendanceRecord>,
}

impl AttendanceStats {
    pub fn compute(
        records: &[AttendanceRecord],
        total_students: usize,
        today: NaiveDate,
        late_after: NaiveTime,
    ) -> Self {
        let today_records: Vec<AttendanceRecord> =
            records.iter().filter(|r| r.date == today).cloned().collect();
        let present_today = today_records
            .iter()
            .map(|r| r.name.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        let late_today = today_records.iter().filter(|r| r.time > late_after).count();

        let attendance_rate = if total_students > 0 {
            present_today as f32 / total_students as f32 * 100.0
        } else {
            0.0
        };

        let week_start = days_before(today, RECENT_DAYS);
        let recent: Vec<&AttendanceRecord> = records.iter().filter(|r| r.date >= week_start).collect();
        let recent_records = recent[recent.len().saturating_sub(RECENT_LIMIT)..]
            .iter()
            .map(|r| (*r).clone())
            .collect();

        Self {
            total_students,
            present_today,
            absent_today: total_students.saturating_sub(present_today),
            attendance_rate,
            late_today,
            today_records,
            recent_records,
        }
    }
}

/// Row count for each of the seven days ending at `today`, oldest first.
pub fn weekly_attendance(records: &[AttendanceRecord], today: NaiveDate) -> Vec<(NaiveDate, usize)> {
    (0..RECENT_DAYS)
        .rev()
        .map(|back| {
            let day = days_before(today, back);
            (day, records.iter().filter(|r| r.date == day).count())
        })
        .collect()
}

/// Attendance over an inclusive date range.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_records: usize,
    pub unique_students: usize,
    pub daily: BTreeMap<NaiveDate, usize>,
    pub per_student: BTreeMap<String, usize>,
}

impl AttendanceReport {
    pub fn export(records: &[AttendanceRecord], start: NaiveDate, end: NaiveDate) -> Self {
        let mut daily = BTreeMap::new();
        let mut per_student = BTreeMap::new();
        let mut total_records = 0;
        for r in records.iter().filter(|r| r.date >= start && r.date <= end) {
            total_records += 1;
            *daily.entry(r.date).or_insert(0) += 1;
            *per_student.entry(r.name.clone()).or_insert(0) += 1;
        }
        Self {
            start,
            end,
            total_records,
            unique_students: per_student.len(),
            daily,
            per_student,
        }
    }

    /// The range used when the caller gives no bounds.
    pub fn default_range(today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (days_before(today, DEFAULT_REPORT_DAYS), today)
    }
}

/// Health of the on-disk state.
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub gallery_trained: bool,
    pub registered_students: usize,
    pub dataset_images: usize,
    pub attendance_records: usize,
    pub last_training: Option<DateTime<Local>>,
}

impl SystemStatus {
    pub fn gather(config: &AppConfig) -> Result<Self> {
        let gallery = &config.paths.gallery;
        let last_training = fs::metadata(gallery)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Local>::from);

        Ok(Self {
            gallery_trained: gallery.exists(),
            registered_students: dataset::person_dirs(&config.paths.dataset)?.len(),
            dataset_images: dataset::count_images(&config.paths.dataset),
            attendance_records: AttendanceLog::new(&config.paths.attendance).read_all()?.len(),
            last_training,
        })
    }
}

fn days_before(day: NaiveDate, n: u64) -> NaiveDate {
    day.checked_sub_days(Days::new(n)).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rec(name: &str, d: u32, h: u32, m: u32) -> AttendanceRecord {
        let at = NaiveDate::from_ymd_opt(2024, 5, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap();
        AttendanceRecord::present(name, at)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn test_stats_today() {
        let records = vec![
            rec("Alice", 9, 8, 55),
            rec("Alice", 10, 8, 50),
            rec("Bob", 10, 9, 0),
            rec("Carol", 10, 9, 12),
        ];
        let stats = AttendanceStats::compute(&records, 4, day(10), nine());
        assert_eq!(stats.present_today, 3);
        assert_eq!(stats.absent_today, 1);
        assert_eq!(stats.attendance_rate, 75.0);
        // 09:00:00 exactly is on time.
        assert_eq!(stats.late_today, 1);
        assert_eq!(stats.today_records.len(), 3);
        assert_eq!(stats.recent_records.len(), 4);
    }

    #[test]
    fn test_stats_without_students() {
        let records = vec![rec("Alice", 10, 8, 0)];
        let stats = AttendanceStats::compute(&records, 0, day(10), nine());
        assert_eq!(stats.attendance_rate, 0.0);
        assert_eq!(stats.absent_today, 0);
    }

    #[test]
    fn test_recent_records_limited() {
        let mut records = vec![rec("Old", 1, 8, 0)];
        for i in 0..12 {
            records.push(rec(&format!("S{}", i), 8, 8, i));
        }
        let stats = AttendanceStats::compute(&records, 20, day(10), nine());
        assert_eq!(stats.recent_records.len(), 10);
        assert_eq!(stats.recent_records[0].name, "S2");
        assert_eq!(stats.recent_records[9].name, "S11");
    }

    #[test]
    fn test_weekly_counts() {
        let records = vec![rec("Alice", 2, 8, 0), rec("Alice", 4, 8, 0), rec("Bob", 4, 8, 0), rec("Bob", 10, 8, 0)];
        let week = weekly_attendance(&records, day(10));
        assert_eq!(week.len(), 7);
        assert_eq!(week[0], (day(4), 2));
        assert_eq!(week[6], (day(10), 1));
        assert_eq!(week.iter().map(|(_, c)| c).sum::<usize>(), 3);
    }

    #[test]
    fn test_report_range_inclusive() {
        let records = vec![
            rec("Alice", 1, 8, 0),
            rec("Alice", 3, 8, 0),
            rec("Bob", 3, 8, 0),
            rec("Bob", 5, 8, 0),
            rec("Carol", 6, 8, 0),
        ];
        let report = AttendanceReport::export(&records, day(3), day(5));
        assert_eq!(report.total_records, 3);
        assert_eq!(report.unique_students, 2);
        assert_eq!(report.daily.get(&day(3)), Some(&2));
        assert_eq!(report.per_student.get("Bob"), Some(&2));

        let (start, end) = AttendanceReport::default_range(day(31));
        assert_eq!(start, day(1));
        assert_eq!(end, day(31));
    }

    #[test]
    fn test_status_on_fresh_layout() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.paths.dataset = dir.path().join("dataset");
        config.paths.gallery = dir.path().join("gallery.bin");
        config.paths.attendance = dir.path().join("attendance.csv");
        config.ensure_directories().unwrap();
        fs::create_dir_all(config.paths.dataset.join("alice")).unwrap();
        fs::write(config.paths.dataset.join("alice").join("a_1.jpg"), b"x").unwrap();

        let status = SystemStatus::gather(&config).unwrap();
        assert!(!status.gallery_trained);
        assert!(status.last_training.is_none());
        assert_eq!(status.registered_students, 1);
        assert_eq!(status.dataset_images, 1);
        assert_eq!(status.attendance_records, 0);
    }
}
