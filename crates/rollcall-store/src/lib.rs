//! rollcall-store — SQLite persistence for students and attendance.

mod schema;
mod sqlite;

pub use sqlite::{SqliteStore, StoreError};
