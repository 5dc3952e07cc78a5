//! Table layout and descriptor blob encoding.

use rollcall_core::Descriptor;

pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    descriptor    BLOB,
    image_mime    TEXT,
    image         BLOB,
    registered_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_students_name ON students(name);

CREATE TABLE IF NOT EXISTS attendance (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id   INTEGER NOT NULL,
    student_name TEXT NOT NULL,
    class_name   TEXT NOT NULL,
    timestamp    INTEGER NOT NULL,
    date         TEXT NOT NULL,
    time         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id);
CREATE INDEX IF NOT EXISTS idx_attendance_timestamp ON attendance(timestamp);
CREATE INDEX IF NOT EXISTS idx_attendance_class ON attendance(class_name);
";

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Little-endian f32 blob.
pub(crate) fn encode_descriptor(descriptor: &Descriptor) -> Vec<u8> {
    descriptor
        .values
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

/// Inverse of [`encode_descriptor`]. Truncated or empty blobs decode to `None`.
pub(crate) fn decode_descriptor(blob: &[u8]) -> Option<Descriptor> {
    if blob.is_empty() || blob.len() % F32_BYTES != 0 {
        return None;
    }
    let values = blob
        .chunks_exact(F32_BYTES)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Some(Descriptor::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_blob_layout() {
        let blob = encode_descriptor(&Descriptor::new(vec![1.0, -0.5]));
        assert_eq!(blob.len(), 8);
        assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_descriptor(&blob).unwrap().values, vec![1.0, -0.5]);
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        assert!(decode_descriptor(&[0, 0, 128]).is_none());
        assert!(decode_descriptor(&[]).is_none());
    }
}
