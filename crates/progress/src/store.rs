//! Read-only view over a student's lesson progress facts.

use std::collections::{HashMap, HashSet};
use lms_core::{LessonId, LessonProgress, StudentId, Time};

use crate::error::{ProgressError, Result};

/// A student's progress records within one course, keyed by lesson.
///
/// Built from whatever the storage backend returned; holds at most one record
/// per lesson.
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    records: HashMap<LessonId, LessonProgress>,
}

impl ProgressStore {
    /// Index one student's records.
    ///
    /// Fails if a record belongs to another student or if a lesson appears twice.
    pub fn from_records(
        student: StudentId,
        records: impl IntoIterator<Item = LessonProgress>,
    ) -> Result<Self> {
        let mut indexed = HashMap::new();
        for record in records {
            if record.student != student {
                return Err(ProgressError::DataIntegrity(format!(
                    "progress record {} belongs to student {}, expected {}",
                    record.id, record.student, student
                )));
            }
            let lesson = record.lesson;
            if indexed.insert(lesson, record).is_some() {
                return Err(ProgressError::DataIntegrity(format!(
                    "duplicate progress records for student {} and lesson {}",
                    student, lesson
                )));
            }
        }
        Ok(Self { records: indexed })
    }

    /// Whether the lesson is marked watched.
    pub fn is_watched(&self, lesson: LessonId) -> bool {
        self.records.get(&lesson).is_some_and(|r| r.watched)
    }

    /// Lessons marked watched.
    pub fn watched(&self) -> HashSet<LessonId> {
        self.records
            .values()
            .filter(|r| r.watched)
            .map(|r| r.lesson)
            .collect()
    }

    /// Record for a lesson, watched or not.
    pub fn record(&self, lesson: LessonId) -> Option<&LessonProgress> {
        self.records.get(&lesson)
    }

    /// Most recent `watched_at` among the given lessons' records.
    pub fn last_accessed<'a>(&self, lessons: impl IntoIterator<Item = &'a LessonId>) -> Option<Time> {
        lessons
            .into_iter()
            .filter_map(|id| self.records.get(id))
            .map(|r| r.watched_at)
            .max()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records at all.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
