//! Course progress engine.
//!
//! Sequential lesson/section unlocking, completion statistics, completion
//! estimates, and once-only certificate issuance over the facts kept by
//! [`lms_storage::Storage`].

#![warn(missing_docs)]

pub mod error;
pub mod config;
pub mod store;
pub mod outline;
pub mod unlock;
pub mod aggregator;
pub mod certificate;
pub mod estimator;
pub mod tracker;

pub use error::{ProgressError, Result};
pub use config::TrackerConfig;
pub use store::ProgressStore;
pub use outline::{CourseOutline, OutlineLesson, OutlineSection};
pub use unlock::{UnlockEngine, LessonState, SectionState};
pub use aggregator::{ProgressAggregator, Progress, SectionProgress};
pub use certificate::{CertificateIssuer, Decision};
pub use estimator::{CompletionEstimator, Estimate};
pub use tracker::{
    ProgressTracker, BasicProgressTracker, ContentRef, WatchOutcome, MarkOutcome,
    StudentProgress, LearningStats, ResumeCourse,
};
