//! Nearest-neighbour matching of an observed descriptor against registered students.

use crate::types::{Descriptor, StudentRecord};

/// Maximum Euclidean distance at which two descriptors count as the same face.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Best candidate for an observed descriptor.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub student: &'a StudentRecord,
    /// Euclidean distance, always `< threshold`.
    pub distance: f32,
}

/// Strategy for comparing an observed descriptor against the registered students.
pub trait Matcher {
    fn find<'a>(
        &self,
        observed: &Descriptor,
        candidates: &'a [StudentRecord],
        threshold: f32,
    ) -> Option<Match<'a>>;
}

/// Linear-scan Euclidean matcher.
///
/// A candidate replaces the current best only when its distance is strictly
/// below both the running minimum and the threshold, so on a tie the
/// candidate that comes first in `candidates` wins.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn find<'a>(
        &self,
        observed: &Descriptor,
        candidates: &'a [StudentRecord],
        threshold: f32,
    ) -> Option<Match<'a>> {
        if observed.is_empty() || candidates.is_empty() {
            return None;
        }

        let mut min_distance = f32::INFINITY;
        let mut best: Option<&StudentRecord> = None;

        for student in candidates {
            let Some(stored) = student.descriptor.as_ref() else {
                continue;
            };
            let Some(distance) = observed.euclidean_distance(stored) else {
                tracing::warn!(
                    student_id = ?student.id,
                    observed_len = observed.len(),
                    stored_len = stored.len(),
                    "skipping student with incomparable descriptor"
                );
                continue;
            };
            if distance < min_distance && distance < threshold {
                min_distance = distance;
                best = Some(student);
            }
        }

        let student = best?;
        tracing::debug!(
            student_id = ?student.id,
            name = %student.name,
            distance = min_distance,
            threshold,
            "descriptor matched"
        );
        Some(Match {
            student,
            distance: min_distance,
        })
    }
}

/// Match with [`EuclideanMatcher`].
pub fn find_match<'a>(
    observed: &Descriptor,
    candidates: &'a [StudentRecord],
    threshold: f32,
) -> Option<Match<'a>> {
    EuclideanMatcher.find(observed, candidates, threshold)
}
