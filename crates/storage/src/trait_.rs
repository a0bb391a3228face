//! Storage trait abstraction.

use async_trait::async_trait;
use lms_core::{
    Certificate, Course, CourseId, Enrollment, Lesson, LessonId, LessonProgress, Section,
    SectionId, StudentId,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Result of writing a watched flag for a (student, lesson) pair.
#[derive(Debug, Clone)]
pub struct ProgressUpsert {
    /// The record as stored after the write
    pub record: LessonProgress,

    /// The record did not exist before this write
    pub created: bool,

    /// Watched flag before this write (`false` when created)
    pub was_watched: bool,
}

impl ProgressUpsert {
    /// The write moved the record into the watched state.
    pub fn became_watched(&self) -> bool {
        self.record.watched && !self.was_watched
    }
}

/// Storage abstraction for LMS data.
///
/// Handles are shared between requests, so every method takes `&self` and
/// backends serialize their own writes. The two get-or-create style writes
/// (`upsert_lesson_progress`, `get_or_create_certificate`) must be atomic per
/// key.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Catalog ===

    /// Save a course (create or update).
    async fn save_course(&self, course: &Course) -> Result<()>;

    /// Load a course by ID.
    async fn load_course(&self, id: CourseId) -> Result<Option<Course>>;

    /// List all courses.
    async fn list_courses(&self) -> Result<Vec<Course>>;

    /// Save a section (create or update).
    async fn save_section(&self, section: &Section) -> Result<()>;

    /// Load a section by ID.
    async fn load_section(&self, id: SectionId) -> Result<Option<Section>>;

    /// List the sections of a course, in no particular order.
    async fn list_sections(&self, course: CourseId) -> Result<Vec<Section>>;

    /// Save a lesson (create or update).
    async fn save_lesson(&self, lesson: &Lesson) -> Result<()>;

    /// Load a lesson by ID.
    async fn load_lesson(&self, id: LessonId) -> Result<Option<Lesson>>;

    /// List every lesson of every section of a course, in no particular order.
    async fn list_lessons(&self, course: CourseId) -> Result<Vec<Lesson>>;

    // === Enrollment ===

    /// Enroll a student. Returns the existing enrollment if there is one.
    async fn enroll(&self, student: StudentId, course: CourseId) -> Result<(Enrollment, bool)>;

    /// Whether the student is enrolled in the course.
    async fn is_enrolled(&self, student: StudentId, course: CourseId) -> Result<bool>;

    /// Enrollments of one student.
    async fn list_student_enrollments(&self, student: StudentId) -> Result<Vec<Enrollment>>;

    /// Enrollments in one course.
    async fn list_course_enrollments(&self, course: CourseId) -> Result<Vec<Enrollment>>;

    // === Progress facts ===

    /// All progress records (watched or not) of a student within a course.
    async fn list_progress(&self, student: StudentId, course: CourseId) -> Result<Vec<LessonProgress>>;

    /// Insert or update the watched flag for (student, lesson).
    async fn upsert_lesson_progress(
        &self,
        student: StudentId,
        lesson: LessonId,
        watched: bool,
    ) -> Result<ProgressUpsert>;

    /// The student's most recent watched record across all courses.
    async fn latest_watched(&self, student: StudentId) -> Result<Option<LessonProgress>>;

    /// Delete a student's progress records within a course. Returns how many were removed.
    async fn delete_progress(&self, student: StudentId, course: CourseId) -> Result<usize>;

    // === Certificates ===

    /// Return the certificate for (student, course), creating it if absent.
    async fn get_or_create_certificate(
        &self,
        student: StudentId,
        course: CourseId,
    ) -> Result<(Certificate, bool)>;

    /// Load the certificate for (student, course).
    async fn load_certificate(&self, student: StudentId, course: CourseId) -> Result<Option<Certificate>>;

    /// Certificates held by a student.
    async fn list_certificates(&self, student: StudentId) -> Result<Vec<Certificate>>;
}
