//! Student-side records: enrollments, watched-lesson facts, and certificates.

use serde::{Deserialize, Serialize};
use crate::id::{CertificateId, CourseId, EnrollmentId, LessonId, ProgressId, StudentId};
use crate::Time;

/// A student's enrollment in a course. At most one per (student, course).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    /// Unique identifier
    pub id: EnrollmentId,

    /// Enrolled student
    pub student: StudentId,

    /// Course enrolled in
    pub course: CourseId,

    /// When enrolled
    pub enrolled_at: Time,
}

impl Enrollment {
    /// Create a new enrollment.
    pub fn new(student: StudentId, course: CourseId) -> Self {
        Self {
            id: EnrollmentId::new(),
            student,
            course,
            enrolled_at: chrono::Utc::now(),
        }
    }
}

/// Fact that a student has (or has not) watched a lesson.
///
/// At most one record exists per (student, lesson); re-watching updates the
/// existing record in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonProgress {
    /// Unique identifier
    pub id: ProgressId,

    /// Student
    pub student: StudentId,

    /// Lesson
    pub lesson: LessonId,

    /// Whether the lesson counts as watched
    pub watched: bool,

    /// When the record was first written
    pub watched_at: Time,
}

impl LessonProgress {
    /// Create a new progress record stamped with the current time.
    pub fn new(student: StudentId, lesson: LessonId, watched: bool) -> Self {
        Self {
            id: ProgressId::new(),
            student,
            lesson,
            watched,
            watched_at: chrono::Utc::now(),
        }
    }
}

/// Proof of completion. Issued once per (student, course) and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    /// Unique identifier
    pub id: CertificateId,

    /// Student
    pub student: StudentId,

    /// Completed course
    pub course: CourseId,

    /// When issued
    pub issued_at: Time,
}

impl Certificate {
    /// Create a new certificate stamped with the current time.
    pub fn new(student: StudentId, course: CourseId) -> Self {
        Self {
            id: CertificateId::new(),
            student,
            course,
            issued_at: chrono::Utc::now(),
        }
    }
}
