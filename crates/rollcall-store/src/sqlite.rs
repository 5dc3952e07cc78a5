//! SQLite-backed [`AttendanceStore`].

use crate::schema::{self, SCHEMA};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rollcall_core::{
    AttendanceId, AttendanceRecord, AttendanceStore, ReferenceImage, StudentId, StudentRecord,
};
use rusqlite::{params, Connection};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// How long a writer waits for another connection's write transaction.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cannot create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt row in {table} (id {id}): {reason}")]
    Corrupt {
        table: &'static str,
        id: i64,
        reason: String,
    },
}

/// Student and attendance tables in one SQLite database.
///
/// `Connection` is `Send` but not `Sync`: give the store to one thread and
/// route every request through it. Other processes may open the same file;
/// [`AttendanceStore::atomically`] holds the database write lock for the
/// whole closure.
pub struct SqliteStore {
    conn: Connection,
}

type StudentRow = (i64, String, Option<Vec<u8>>, Option<String>, Option<Vec<u8>>, String);
type AttendanceRow = (i64, i64, String, String, i64, String, String);

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened attendance database");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Look up one student by id.
    #[cfg(test)]
    fn student(&self, id: StudentId) -> Result<Option<StudentRecord>, StoreError> {
        use rusqlite::OptionalExtension;

        let row = self
            .conn
            .query_row(
                "SELECT id, name, descriptor, image_mime, image, registered_at
                 FROM students WHERE id = ?1",
                params![id],
                student_row,
            )
            .optional()?;
        row.map(student_from_row).transpose()
    }
}

fn student_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn student_from_row(
    (id, name, descriptor, image_mime, image, registered_at): StudentRow,
) -> Result<StudentRecord, StoreError> {
    let registered_at = DateTime::parse_from_rfc3339(&registered_at)
        .map_err(|e| StoreError::Corrupt {
            table: "students",
            id,
            reason: format!("registered_at {registered_at:?}: {e}"),
        })?
        .with_timezone(&Utc);

    let descriptor = descriptor.as_deref().and_then(|blob| {
        let decoded = schema::decode_descriptor(blob);
        if decoded.is_none() {
            tracing::warn!(student_id = id, bytes = blob.len(), "undecodable descriptor blob");
        }
        decoded
    });

    let image = match (image_mime, image) {
        (Some(mime), Some(bytes)) => Some(ReferenceImage { mime, bytes }),
        _ => None,
    };

    Ok(StudentRecord {
        id: Some(id),
        name,
        descriptor,
        image,
        registered_at,
    })
}

fn attendance_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn attendance_from_row(
    (id, student_id, student_name, class_name, timestamp, date, time): AttendanceRow,
) -> Result<AttendanceRecord, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        table: "attendance",
        id,
        reason,
    };
    let date = date
        .parse::<NaiveDate>()
        .map_err(|e| corrupt(format!("date {date:?}: {e}")))?;
    let time = time
        .parse::<NaiveTime>()
        .map_err(|e| corrupt(format!("time {time:?}: {e}")))?;

    Ok(AttendanceRecord {
        id: Some(id),
        student_id,
        student_name,
        class_name,
        timestamp,
        date,
        time,
    })
}

impl AttendanceStore for SqliteStore {
    type Error = StoreError;

    /// Runs `f` inside `BEGIN IMMEDIATE`, committing on success and rolling
    /// back on error.
    fn atomically<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Self) -> Result<T, StoreError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    fn all_students(&self) -> Result<Vec<StudentRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, descriptor, image_mime, image, registered_at
             FROM students ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], student_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(student_from_row).collect()
    }

    fn all_attendance(&self, class_name: Option<&str>) -> Result<Vec<AttendanceRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, student_id, student_name, class_name, timestamp, date, time
             FROM attendance
             WHERE ?1 IS NULL OR class_name = ?1
             ORDER BY timestamp DESC, id DESC",
        )?;
        let rows = stmt
            .query_map(params![class_name], attendance_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(attendance_from_row).collect()
    }

    fn add_student(&mut self, student: &StudentRecord) -> Result<StudentId, StoreError> {
        let descriptor = student.descriptor.as_ref().map(schema::encode_descriptor);
        let (image_mime, image) = match &student.image {
            Some(img) => (Some(img.mime.as_str()), Some(img.bytes.as_slice())),
            None => (None, None),
        };
        self.conn.execute(
            "INSERT INTO students (name, descriptor, image_mime, image, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                student.name,
                descriptor,
                image_mime,
                image,
                student.registered_at.to_rfc3339(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(student_id = id, name = %student.name, "student row inserted");
        Ok(id)
    }

    fn add_attendance(&mut self, record: &AttendanceRecord) -> Result<AttendanceId, StoreError> {
        self.conn.execute(
            "INSERT INTO attendance (student_id, student_name, class_name, timestamp, date, time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.student_id,
                record.student_name,
                record.class_name,
                record.timestamp,
                record.date.to_string(),
                record.time.to_string(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn delete_student(&mut self, id: StudentId) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM students WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn delete_all_students(&mut self) -> Result<usize, StoreError> {
        Ok(self.conn.execute("DELETE FROM students", [])?)
    }

    fn clear_attendance(&mut self, class_name: Option<&str>) -> Result<usize, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM attendance WHERE ?1 IS NULL OR class_name = ?1",
            params![class_name],
        )?;
        tracing::info!(class = ?class_name, removed, "attendance cleared");
        Ok(removed)
    }

    fn class_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT class_name FROM attendance
             WHERE class_name <> ''
             GROUP BY class_name
             ORDER BY MAX(timestamp) DESC",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rollcall_core::{
        check_in, CheckIn, DatePolicy, Descriptor, EuclideanMatcher, DEFAULT_MATCH_THRESHOLD,
    };

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, 0, 0).unwrap()
    }

    fn log(student_id: StudentId, class_name: &str, when: DateTime<Utc>) -> AttendanceRecord {
        let (date, time) = DatePolicy::Utc.split(when);
        AttendanceRecord {
            id: None,
            student_id,
            student_name: format!("s{student_id}"),
            class_name: class_name.into(),
            timestamp: when.timestamp_millis(),
            date,
            time,
        }
    }

    #[test]
    fn test_student_roundtrip_with_image() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let student = StudentRecord::new("Ada", Descriptor::new(vec![0.25; 128]), at(1, 8))
            .with_image(ReferenceImage {
                mime: "image/jpeg".into(),
                bytes: vec![0xff, 0xd8, 0xff],
            });

        let id = store.add_student(&student).unwrap();
        let loaded = store.student(id).unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.name, "Ada");
        assert_eq!(loaded.descriptor, student.descriptor);
        assert_eq!(loaded.image, student.image);
        assert_eq!(loaded.registered_at, student.registered_at);
        assert!(store.student(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_student_without_descriptor() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut student = StudentRecord::new("Ghost", Descriptor::new(vec![0.0]), at(1, 8));
        student.descriptor = None;
        store.add_student(&student).unwrap();
        assert!(store.all_students().unwrap()[0].descriptor.is_none());
    }

    #[test]
    fn test_attendance_order_and_filter() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.add_attendance(&log(1, "Math", at(1, 9))).unwrap();
        store.add_attendance(&log(2, "Art", at(3, 9))).unwrap();
        store.add_attendance(&log(3, "Math", at(2, 9))).unwrap();

        let all: Vec<_> = store.all_attendance(None).unwrap().iter().map(|r| r.student_id).collect();
        assert_eq!(all, vec![2, 3, 1]);

        let math = store.all_attendance(Some("Math")).unwrap();
        assert_eq!(math.len(), 2);
        assert_eq!(math[0].date, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
        assert_eq!(math[0].time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());

        assert_eq!(store.class_names().unwrap(), vec!["Art".to_string(), "Math".to_string()]);
    }

    #[test]
    fn test_clear_and_delete() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.add_attendance(&log(1, "Math", at(1, 9))).unwrap();
        store.add_attendance(&log(2, "Art", at(1, 9))).unwrap();
        assert_eq!(store.clear_attendance(Some("Math")).unwrap(), 1);
        assert_eq!(store.all_attendance(None).unwrap()[0].class_name, "Art");
        assert_eq!(store.clear_attendance(None).unwrap(), 1);

        let id = store
            .add_student(&StudentRecord::new("a", Descriptor::new(vec![0.0]), at(1, 8)))
            .unwrap();
        store
            .add_student(&StudentRecord::new("b", Descriptor::new(vec![0.0]), at(1, 8)))
            .unwrap();
        assert!(store.delete_student(id).unwrap());
        assert!(!store.delete_student(id).unwrap());
        assert_eq!(store.delete_all_students().unwrap(), 1);
    }

    #[test]
    fn test_check_in_through_sqlite_persists_once() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .add_student(&StudentRecord::new("Ada", Descriptor::new(vec![0.0; 128]), at(1, 8)))
            .unwrap();

        let observed = Descriptor::new(vec![0.001; 128]);
        for hour in [9, 10, 11] {
            check_in(
                &mut store,
                &EuclideanMatcher,
                &observed,
                "Math",
                DEFAULT_MATCH_THRESHOLD,
                DatePolicy::Utc,
                at(3, hour),
            )
            .unwrap();
        }
        assert_eq!(store.all_attendance(Some("Math")).unwrap().len(), 1);

        let next_day = check_in(
            &mut store,
            &EuclideanMatcher,
            &observed,
            "Math",
            DEFAULT_MATCH_THRESHOLD,
            DatePolicy::Utc,
            at(4, 9),
        )
        .unwrap();
        assert!(matches!(next_day, CheckIn::Logged { .. }));
    }

    #[test]
    fn test_reopen_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/attendance.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .add_student(&StudentRecord::new("Ada", Descriptor::new(vec![0.5; 4]), at(1, 8)))
                .unwrap();
            store.add_attendance(&log(1, "Math", at(1, 9))).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.all_students().unwrap().len(), 1);
        assert_eq!(store.all_attendance(Some("Math")).unwrap().len(), 1);
    }

    /// Separate connections to one file, all checking in the same face at
    /// once, still leave one record per day.
    #[test]
    fn test_concurrent_connections_log_once_per_day() {
        use std::sync::{Arc, Barrier};

        const WRITERS: usize = 8;
        const DAYS: u32 = 10;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.db");
        SqliteStore::open(&path)
            .unwrap()
            .add_student(&StudentRecord::new("Ada", Descriptor::new(vec![0.0; 128]), at(1, 8)))
            .unwrap();

        let stores: Vec<_> = (0..WRITERS).map(|_| SqliteStore::open(&path).unwrap()).collect();
        let barrier = Arc::new(Barrier::new(WRITERS));
        let handles: Vec<_> = stores
            .into_iter()
            .map(|mut store| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let observed = Descriptor::new(vec![0.001; 128]);
                    let mut logged = 0;
                    for day in 1..=DAYS {
                        barrier.wait();
                        let outcome = check_in(
                            &mut store,
                            &EuclideanMatcher,
                            &observed,
                            "Math",
                            DEFAULT_MATCH_THRESHOLD,
                            DatePolicy::Utc,
                            at(day, 9),
                        )
                        .unwrap();
                        if let CheckIn::Logged { .. } = outcome {
                            logged += 1;
                        }
                    }
                    logged
                })
            })
            .collect();

        let logged: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(logged, DAYS);

        let records = SqliteStore::open(&path).unwrap().all_attendance(Some("Math")).unwrap();
        assert_eq!(records.len(), DAYS as usize);
        let mut dates: Vec<_> = records.iter().map(|r| r.date).collect();
        dates.dedup();
        assert_eq!(dates.len(), DAYS as usize);
    }

    #[test]
    fn test_atomically_rolls_back_on_error() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let result: Result<(), StoreError> = store.atomically(|store| {
            store.add_attendance(&log(1, "Math", at(1, 9)))?;
            Err(StoreError::Corrupt {
                table: "attendance",
                id: 0,
                reason: "forced".into(),
            })
        });
        assert!(result.is_err());
        assert!(store.all_attendance(None).unwrap().is_empty());

        store
            .atomically(|store| store.add_attendance(&log(1, "Math", at(1, 9))))
            .unwrap();
        assert_eq!(store.all_attendance(None).unwrap().len(), 1);
    }
}
