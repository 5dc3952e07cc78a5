//! Day-by-day view of the attendance log.

use crate::calendar::DatePolicy;
use crate::types::AttendanceRecord;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Attendance records sharing one calendar date.
#[derive(Debug, Clone, Serialize)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub records: Vec<AttendanceRecord>,
}

/// Group records by calendar date under `policy`, newest date first.
///
/// The date comes from each record's timestamp, the same way the once-per-day
/// check derives it. The stored `date` is only used when the timestamp is out
/// of range. Records within a day keep their input order.
pub fn group_by_date(records: &[AttendanceRecord], policy: DatePolicy) -> Vec<DayGroup> {
    let mut days: BTreeMap<NaiveDate, Vec<AttendanceRecord>> = BTreeMap::new();
    for record in records {
        let date = policy.date_of(record.timestamp).unwrap_or(record.date);
        days.entry(date).or_default().push(record.clone());
    }
    days.into_iter()
        .rev()
        .map(|(date, records)| DayGroup { date, records })
        .collect()
}
