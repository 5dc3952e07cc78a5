//! Recognition → dedup → persist.
//!
//! These functions read, check, then write through the store. Each sequence
//! runs as one [`AttendanceStore::atomically`] unit.

use crate::attendance;
use crate::calendar::DatePolicy;
use crate::matcher::Matcher;
use crate::store::AttendanceStore;
use crate::types::{AttendanceRecord, Descriptor, StudentId, StudentRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of presenting a descriptor for check-in.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckIn {
    /// No class is active.
    NoClass,
    /// No registered student within threshold.
    NoMatch,
    /// Recognized, but already checked in to this class today.
    AlreadyLogged { student: StudentRecord, distance: f32 },
    /// Recognized and a new record was persisted.
    Logged { record: AttendanceRecord, distance: f32 },
}

/// Match `observed` against every registered student and log attendance for the best match.
///
/// The read-check-write runs inside [`AttendanceStore::atomically`], so two
/// writers sharing a store cannot both log the same student for the same day.
pub fn check_in<S, M>(
    store: &mut S,
    matcher: &M,
    observed: &Descriptor,
    class_name: &str,
    threshold: f32,
    policy: DatePolicy,
    now: DateTime<Utc>,
) -> Result<CheckIn, S::Error>
where
    S: AttendanceStore,
    M: Matcher + ?Sized,
{
    if class_name.is_empty() {
        return Ok(CheckIn::NoClass);
    }
    store.atomically(|store| {
        let students = store.all_students()?;
        let Some(found) = matcher.find(observed, &students, threshold) else {
            tracing::debug!(candidates = students.len(), threshold, "no student matched");
            return Ok(CheckIn::NoMatch);
        };
        let distance = found.distance;
        let student = found.student.clone();
        let Some(student_id) = student.id else {
            // Stores always hand back persisted students.
            return Ok(CheckIn::NoMatch);
        };

        match log_if_absent(store, student_id, &student.name, class_name, policy, now)? {
            None => Ok(CheckIn::AlreadyLogged { student, distance }),
            Some(record) => {
                tracing::info!(
                    attendance_id = ?record.id,
                    student_id,
                    name = %record.student_name,
                    class = class_name,
                    distance,
                    "attendance logged"
                );
                Ok(CheckIn::Logged { record, distance })
            }
        }
    })
}

/// Persist a new attendance record unless the student already has one for that day.
fn log_if_absent<S: AttendanceStore>(
    store: &mut S,
    student_id: StudentId,
    student_name: &str,
    class_name: &str,
    policy: DatePolicy,
    now: DateTime<Utc>,
) -> Result<Option<AttendanceRecord>, S::Error> {
    let logs = store.all_attendance(Some(class_name))?;
    match attendance::log_attendance_at(student_id, student_name, class_name, &logs, policy, now) {
        None => Ok(None),
        Some(mut record) => {
            record.id = Some(store.add_attendance(&record)?);
            Ok(Some(record))
        }
    }
}

/// Result of registering a student.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub student: StudentRecord,
    /// First check-in, when a class was active.
    pub attendance: Option<AttendanceRecord>,
}

/// Persist a new student and, when `class_name` is non-empty, check them in.
pub fn register<S>(
    store: &mut S,
    student: StudentRecord,
    class_name: Option<&str>,
    policy: DatePolicy,
    now: DateTime<Utc>,
) -> Result<Registration, S::Error>
where
    S: AttendanceStore,
{
    store.atomically(|store| {
        let id = store.add_student(&student)?;
        let student = StudentRecord {
            id: Some(id),
            ..student
        };
        tracing::info!(student_id = id, name = %student.name, "student registered");

        let attendance = match class_name.filter(|c| !c.is_empty()) {
            None => None,
            Some(class) => log_if_absent(store, id, &student.name, class, policy, now)?,
        };

        Ok(Registration { student, attendance })
    })
}
