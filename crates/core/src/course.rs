//! Catalog model - courses, their sections, and the lessons inside them.

use serde::{Deserialize, Serialize};
use crate::id::{CourseId, LessonId, SectionId};
use crate::Time;

/// A course is an ordered list of sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    /// Unique identifier
    pub id: CourseId,

    /// Course title
    pub title: String,

    /// Lessons and sections must be consumed in order
    pub is_sequential: bool,

    /// A certificate is issued on full completion
    pub has_certificate: bool,

    /// When created
    pub created_at: Time,
}

impl Course {
    /// Create a new non-sequential course without a certificate.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: CourseId::new(),
            title: title.into(),
            is_sequential: false,
            has_certificate: false,
            created_at: chrono::Utc::now(),
        }
    }

    /// Require lessons to be watched in order.
    pub fn sequential(mut self, is_sequential: bool) -> Self {
        self.is_sequential = is_sequential;
        self
    }

    /// Issue a certificate on completion.
    pub fn with_certificate(mut self, has_certificate: bool) -> Self {
        self.has_certificate = has_certificate;
        self
    }
}

/// A section groups lessons inside a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Unique identifier
    pub id: SectionId,

    /// Owning course
    pub course_id: CourseId,

    /// Section title
    pub title: String,

    /// Traversal order, unique within the course
    pub order: u32,
}

impl Section {
    /// Create a new section.
    pub fn new(course_id: CourseId, title: impl Into<String>, order: u32) -> Self {
        Self {
            id: SectionId::new(),
            course_id,
            title: title.into(),
            order,
        }
    }
}

/// A lesson is the atomic unit of progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    /// Unique identifier
    pub id: LessonId,

    /// Owning section
    pub section_id: SectionId,

    /// Lesson title
    pub title: String,

    /// Order, unique within the section
    pub order: u32,

    /// Duration in hours, if known
    #[serde(default)]
    pub duration_hours: Option<f64>,
}

impl Lesson {
    /// Create a new lesson.
    pub fn new(section_id: SectionId, title: impl Into<String>, order: u32) -> Self {
        Self {
            id: LessonId::new(),
            section_id,
            title: title.into(),
            order,
            duration_hours: None,
        }
    }

    /// Set the lesson duration.
    pub fn with_duration(mut self, hours: f64) -> Self {
        self.duration_hours = Some(hours);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_defaults() {
        let course = Course::new("Rust 101");
        assert!(!course.is_sequential);
        assert!(!course.has_certificate);

        let course = course.sequential(true).with_certificate(true);
        assert!(course.is_sequential);
        assert!(course.has_certificate);
    }

    #[test]
    fn test_lesson_duration_is_optional_in_json() {
        let lesson = Lesson::new(SectionId::new(), "Intro", 1);
        let mut value = serde_json::to_value(&lesson).unwrap();
        value.as_object_mut().unwrap().remove("duration_hours");

        let loaded: Lesson = serde_json::from_value(value).unwrap();
        assert_eq!(loaded.duration_hours, None);
        assert_eq!(loaded.order, 1);
    }
}
