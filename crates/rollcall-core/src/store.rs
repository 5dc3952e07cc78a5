//! Persistence collaborator.
//!
//! The store owns every record. Matching and deduplication borrow what it
//! returns for the length of one call and never hold on to it.

use crate::types::{AttendanceId, AttendanceRecord, StudentId, StudentRecord};
use std::convert::Infallible;

/// Student and attendance persistence.
pub trait AttendanceStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn all_students(&self) -> Result<Vec<StudentRecord>, Self::Error>;

    /// Attendance records, newest first, optionally restricted to one class.
    fn all_attendance(&self, class_name: Option<&str>) -> Result<Vec<AttendanceRecord>, Self::Error>;

    /// Persist a student; the record's own `id` is ignored.
    fn add_student(&mut self, student: &StudentRecord) -> Result<StudentId, Self::Error>;

    /// Persist an attendance record; the record's own `id` is ignored.
    fn add_attendance(&mut self, record: &AttendanceRecord) -> Result<AttendanceId, Self::Error>;

    /// Returns whether a student was removed.
    fn delete_student(&mut self, id: StudentId) -> Result<bool, Self::Error>;

    fn delete_all_students(&mut self) -> Result<usize, Self::Error>;

    /// Remove attendance for one class, or all of it. Returns rows removed.
    fn clear_attendance(&mut self, class_name: Option<&str>) -> Result<usize, Self::Error>;

    /// Run `f` so that no other writer to the same data can interleave with it.
    ///
    /// Stores shared between processes must make this a real write
    /// transaction. A store owned by a single caller can run `f` directly.
    fn atomically<T, F>(&mut self, f: F) -> Result<T, Self::Error>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T, Self::Error>,
    {
        f(self)
    }

    /// Distinct non-empty class names, in order of most recent activity.
    fn class_names(&self) -> Result<Vec<String>, Self::Error> {
        let mut names: Vec<String> = Vec::new();
        for log in self.all_attendance(None)? {
            if !log.class_name.is_empty() && !names.contains(&log.class_name) {
                names.push(log.class_name);
            }
        }
        Ok(names)
    }
}

/// Vec-backed store with monotonically increasing ids.
#[derive(Debug, Default)]
pub struct MemoryStore {
    students: Vec<StudentRecord>,
    attendance: Vec<AttendanceRecord>,
    next_student_id: StudentId,
    next_attendance_id: AttendanceId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttendanceStore for MemoryStore {
    type Error = Infallible;

    fn all_students(&self) -> Result<Vec<StudentRecord>, Self::Error> {
        Ok(self.students.clone())
    }

    fn all_attendance(&self, class_name: Option<&str>) -> Result<Vec<AttendanceRecord>, Self::Error> {
        let mut logs: Vec<AttendanceRecord> = self
            .attendance
            .iter()
            .filter(|log| class_name.map_or(true, |c| log.class_name == c))
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(logs)
    }

    fn add_student(&mut self, student: &StudentRecord) -> Result<StudentId, Self::Error> {
        self.next_student_id += 1;
        let id = self.next_student_id;
        self.students.push(StudentRecord {
            id: Some(id),
            ..student.clone()
        });
        Ok(id)
    }

    fn add_attendance(&mut self, record: &AttendanceRecord) -> Result<AttendanceId, Self::Error> {
        self.next_attendance_id += 1;
        let id = self.next_attendance_id;
        self.attendance.push(AttendanceRecord {
            id: Some(id),
            ..record.clone()
        });
        Ok(id)
    }

    fn delete_student(&mut self, id: StudentId) -> Result<bool, Self::Error> {
        let before = self.students.len();
        self.students.retain(|s| s.id != Some(id));
        Ok(self.students.len() != before)
    }

    fn delete_all_students(&mut self) -> Result<usize, Self::Error> {
        Ok(self.students.drain(..).count())
    }

    fn clear_attendance(&mut self, class_name: Option<&str>) -> Result<usize, Self::Error> {
        let before = self.attendance.len();
        match class_name {
            Some(class) => self.attendance.retain(|log| log.class_name != class),
            None => self.attendance.clear(),
        }
        Ok(before - self.attendance.len())
    }
}
