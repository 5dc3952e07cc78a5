//! rollcall-core — Face-descriptor matching and attendance deduplication.
//!
//! Descriptors come from an external face-recognition model. This crate
//! decides which registered student a descriptor belongs to and whether
//! that student still needs to be checked in to a class today.

pub mod attendance;
pub mod calendar;
pub mod checkin;
pub mod matcher;
pub mod report;
pub mod store;
pub mod types;

pub use attendance::{has_attendance_on, has_attendance_today, log_attendance, log_attendance_at};
pub use calendar::{CalendarError, DatePolicy};
pub use checkin::{check_in, register, CheckIn, Registration};
pub use matcher::{find_match, EuclideanMatcher, Match, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use report::{group_by_date, DayGroup};
pub use store::{AttendanceStore, MemoryStore};
pub use types::{
    AttendanceId, AttendanceRecord, Descriptor, DescriptorError, ReferenceImage, StudentId,
    StudentRecord,
};
