//! LMS core data models.
//!
//! This crate defines the catalog (courses, sections, lessons) and the
//! per-student records (enrollments, lesson progress, certificates) that the
//! progress engine computes over.

#![warn(missing_docs)]

// Core identities
mod id;

// Catalog
mod course;

// Student records
mod enrollment;

// Re-exports
pub use id::*;

pub use course::{Course, Section, Lesson};
pub use enrollment::{Enrollment, LessonProgress, Certificate};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
