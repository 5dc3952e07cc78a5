//! Once-per-day attendance deduplication.
//!
//! A student is logged at most once per class per calendar day. "Today" is
//! recomputed on every call, so the check resets at midnight under the
//! active [`DatePolicy`].

use crate::calendar::DatePolicy;
use crate::types::{AttendanceRecord, StudentId};
use chrono::{DateTime, NaiveDate, Utc};

/// Whether `logs` holds a record for this student and class on `date`.
pub fn has_attendance_on(
    student_id: StudentId,
    class_name: &str,
    logs: &[AttendanceRecord],
    date: NaiveDate,
    policy: DatePolicy,
) -> bool {
    logs.iter().any(|log| {
        log.student_id == student_id
            && log.class_name == class_name
            && policy.date_of(log.timestamp) == Some(date)
    })
}

/// Whether `logs` holds a record for this student and class today.
pub fn has_attendance_today(
    student_id: StudentId,
    class_name: &str,
    logs: &[AttendanceRecord],
    policy: DatePolicy,
) -> bool {
    has_attendance_on(student_id, class_name, logs, policy.today(Utc::now()), policy)
}

/// Build a new attendance record for `now`, unless one already exists for that day.
///
/// Returns `None` when the student is already logged. The record is not
/// persisted; the caller hands it to the store.
pub fn log_attendance_at(
    student_id: StudentId,
    student_name: &str,
    class_name: &str,
    logs: &[AttendanceRecord],
    policy: DatePolicy,
    now: DateTime<Utc>,
) -> Option<AttendanceRecord> {
    let (date, time) = policy.split(now);
    if has_attendance_on(student_id, class_name, logs, date, policy) {
        tracing::debug!(
            student_id,
            class = class_name,
            %date,
            "attendance already logged today"
        );
        return None;
    }

    Some(AttendanceRecord {
        id: None,
        student_id,
        student_name: student_name.to_string(),
        class_name: class_name.to_string(),
        timestamp: now.timestamp_millis(),
        date,
        time,
    })
}

/// [`log_attendance_at`] with the current time.
pub fn log_attendance(
    student_id: StudentId,
    student_name: &str,
    class_name: &str,
    logs: &[AttendanceRecord],
    policy: DatePolicy,
) -> Option<AttendanceRecord> {
    log_attendance_at(student_id, student_name, class_name, logs, policy, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn record(student_id: StudentId, class_name: &str, when: DateTime<Utc>) -> AttendanceRecord {
        let (date, time) = DatePolicy::Utc.split(when);
        AttendanceRecord {
            id: Some(1),
            student_id,
            student_name: format!("student-{student_id}"),
            class_name: class_name.into(),
            timestamp: when.timestamp_millis(),
            date,
            time,
        }
    }

    #[test]
    fn test_empty_log_has_no_attendance() {
        assert!(!has_attendance_today(5, "Math", &[], DatePolicy::Local));
        assert!(!has_attendance_on(
            5,
            "Math",
            &[],
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            DatePolicy::Utc
        ));
    }

    #[test]
    fn test_same_day_different_day() {
        let logs = vec![record(5, "Math", at(2024, 6, 1, 9))];
        let june1 = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let june2 = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();

        assert!(has_attendance_on(5, "Math", &logs, june1, DatePolicy::Utc));
        assert!(!has_attendance_on(5, "Math", &logs, june2, DatePolicy::Utc));
    }

    #[test]
    fn test_student_and_class_must_both_match() {
        let logs = vec![record(5, "Math", at(2024, 6, 1, 9))];
        let june1 = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        assert!(!has_attendance_on(6, "Math", &logs, june1, DatePolicy::Utc));
        assert!(!has_attendance_on(5, "Physics", &logs, june1, DatePolicy::Utc));
        assert!(!has_attendance_on(5, "math", &logs, june1, DatePolicy::Utc));
    }

    #[test]
    fn test_today_uses_current_date() {
        let logs = vec![record(5, "Math", Utc::now())];
        assert!(has_attendance_today(5, "Math", &logs, DatePolicy::Utc));
    }

    #[test]
    fn test_log_twice_same_day_yields_one_record() {
        let mut logs = Vec::new();

        let first = log_attendance_at(5, "Ada", "Math", &logs, DatePolicy::Utc, at(2024, 6, 1, 9));
        let first = first.expect("first check-in is logged");
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(first.time.to_string(), "09:00:00");
        assert_eq!(first.student_name, "Ada");
        logs.push(first);

        let second = log_attendance_at(5, "Ada", "Math", &logs, DatePolicy::Utc, at(2024, 6, 1, 15));
        assert!(second.is_none());
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn test_log_resets_next_day_and_per_class() {
        let logs = vec![record(5, "Math", at(2024, 6, 1, 9))];

        assert!(log_attendance_at(5, "Ada", "Math", &logs, DatePolicy::Utc, at(2024, 6, 2, 9)).is_some());
        assert!(log_attendance_at(5, "Ada", "Physics", &logs, DatePolicy::Utc, at(2024, 6, 1, 10)).is_some());
    }

    #[test]
    fn test_midnight_rollover_follows_policy() {
        // 22:30 UTC on June 1 is already June 2 at +02:00.
        let logs = vec![record(5, "Math", at(2024, 6, 1, 22))];
        let plus_two: DatePolicy = "+02:00".parse().unwrap();

        assert!(log_attendance_at(5, "Ada", "Math", &logs, DatePolicy::Utc, at(2024, 6, 1, 23)).is_none());
        assert!(log_attendance_at(5, "Ada", "Math", &logs, plus_two, at(2024, 6, 1, 23)).is_none());
        assert!(log_attendance_at(5, "Ada", "Math", &logs, plus_two, at(2024, 6, 1, 21)).is_some());
    }
}
