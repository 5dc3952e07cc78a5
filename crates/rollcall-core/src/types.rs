use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier assigned to a student by the store.
pub type StudentId = i64;

/// Identifier assigned to an attendance record by the store.
pub type AttendanceId = i64;

/// Face descriptor vector (128-dimensional for the face-api recognition net).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("descriptor is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("descriptor is empty")]
    Empty,
    #[error("expected {expected}-dim descriptor, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("descriptor contains a non-finite value at index {0}")]
    NonFinite(usize),
}

/// Accepted JSON shapes: a bare array, or a capture payload with a `descriptor` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorJson {
    Bare(Vec<f32>),
    Capture { descriptor: Vec<f32> },
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse a descriptor produced by the external recognition model.
    pub fn from_json(src: &str) -> Result<Self, DescriptorError> {
        let values = match serde_json::from_str::<DescriptorJson>(src)? {
            DescriptorJson::Bare(values) => values,
            DescriptorJson::Capture { descriptor } => descriptor,
        };
        let descriptor = Self { values };
        descriptor.validate(None)?;
        Ok(descriptor)
    }

    /// Check that the descriptor is non-empty, finite, and (optionally) of the expected length.
    pub fn validate(&self, expected_len: Option<usize>) -> Result<(), DescriptorError> {
        if self.values.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if let Some(expected) = expected_len {
            if self.values.len() != expected {
                return Err(DescriptorError::WrongLength {
                    expected,
                    actual: self.values.len(),
                });
            }
        }
        if let Some(idx) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite(idx));
        }
        Ok(())
    }

    /// Euclidean distance to another descriptor.
    ///
    /// Returns `None` when either side is empty, the lengths differ, or the
    /// result is not finite. Callers treat that as "not comparable".
    pub fn euclidean_distance(&self, other: &Descriptor) -> Option<f32> {
        if self.values.is_empty() || self.values.len() != other.values.len() {
            return None;
        }
        let dist = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt();
        dist.is_finite().then_some(dist)
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Photo captured at registration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceImage {
    /// MIME type, e.g. "image/jpeg".
    pub mime: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// A registered student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    /// `None` until the store assigns one.
    pub id: Option<StudentId>,
    pub name: String,
    pub descriptor: Option<Descriptor>,
    pub image: Option<ReferenceImage>,
    pub registered_at: DateTime<Utc>,
}

impl StudentRecord {
    pub fn new(name: impl Into<String>, descriptor: Descriptor, registered_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            name: name.into(),
            descriptor: Some(descriptor),
            image: None,
            registered_at,
        }
    }

    pub fn with_image(mut self, image: ReferenceImage) -> Self {
        self.image = Some(image);
        self
    }
}

/// One check-in of a student into a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// `None` until the store assigns one.
    pub id: Option<AttendanceId>,
    pub student_id: StudentId,
    /// Copied from the student at check-in time; not kept in sync.
    pub student_name: String,
    pub class_name: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
}
