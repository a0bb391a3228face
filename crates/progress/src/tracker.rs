//! Progress tracking service.
//!
//! Fetches catalog and progress facts from storage, runs the pure engines
//! over them, and fires certificate issuance when a lesson becomes watched.

use std::sync::Arc;
use async_trait::async_trait;
use chrono::Utc;
use lms_core::{
    Course, CourseId, Enrollment, Lesson, LessonId, Section, SectionId, StudentId, Time,
};
use lms_storage::{ProgressUpsert, Storage};
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregator::{Progress, ProgressAggregator, SectionProgress};
use crate::certificate::{CertificateIssuer, Decision};
use crate::config::TrackerConfig;
use crate::error::{ProgressError, Result};
use crate::estimator::{CompletionEstimator, Estimate};
use crate::outline::CourseOutline;
use crate::store::ProgressStore;
use crate::unlock::{LessonState, SectionState, UnlockEngine};

/// A lockable item of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRef {
    /// A lesson
    Lesson(LessonId),
    /// A section
    Section(SectionId),
}

/// Result of [`ProgressTracker::on_lesson_watched`].
#[derive(Debug, Clone)]
pub struct WatchOutcome {
    /// A certificate was created by this event
    pub certificate_issued: bool,

    /// Full issuer decision
    pub decision: Decision,
}

/// Result of [`ProgressTracker::mark_watched`].
#[derive(Debug, Clone)]
pub struct MarkOutcome {
    /// The stored progress record and how it changed
    pub upsert: ProgressUpsert,

    /// Present when the write moved the lesson into the watched state
    pub watch: Option<WatchOutcome>,
}

impl MarkOutcome {
    /// A certificate was created as a consequence of this write.
    pub fn certificate_issued(&self) -> bool {
        self.watch.as_ref().is_some_and(|w| w.certificate_issued)
    }
}

/// One enrolled student's standing in a course.
#[derive(Debug, Clone, Serialize)]
pub struct StudentProgress {
    /// Student
    pub student: StudentId,

    /// When enrolled
    pub enrolled_at: Time,

    /// Figures
    #[serde(flatten)]
    pub progress: Progress,
}

/// A student's totals across all enrollments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningStats {
    /// Courses enrolled in
    pub courses_enrolled: usize,

    /// Hours of watched lessons across those courses
    pub hours_learned: f64,

    /// Certificates held
    pub certificates: usize,
}

/// The course a student should pick up next.
#[derive(Debug, Clone, Serialize)]
pub struct ResumeCourse {
    /// Course of the most recently watched lesson
    pub course: Course,

    /// Figures
    pub progress: Progress,

    /// Hours left at the course's lesson durations
    pub remaining_hours: f64,

    /// Bucketed estimate at the configured pace
    pub estimate: Estimate,
}

/// Progress tracking service.
#[async_trait]
pub trait ProgressTracker: Send + Sync {
    /// Whether a lesson or section is locked for a student.
    async fn is_locked(&self, student: StudentId, course: CourseId, item: ContentRef) -> Result<bool>;

    /// Completion figures for a student in a course.
    async fn get_progress(&self, student: StudentId, course: CourseId) -> Result<Progress>;

    /// Evaluate certificate issuance after a lesson became watched.
    ///
    /// Call right after the progress write that set `watched = true`.
    async fn on_lesson_watched(&self, student: StudentId, lesson: LessonId) -> Result<WatchOutcome>;

    /// Record a watched flag and, on the unwatched → watched edge, run
    /// [`on_lesson_watched`](Self::on_lesson_watched).
    async fn mark_watched(&self, student: StudentId, lesson: LessonId, watched: bool) -> Result<MarkOutcome>;
}

/// Storage-backed progress tracker.
#[derive(Clone)]
pub struct BasicProgressTracker {
    storage: Arc<dyn Storage>,
    config: TrackerConfig,
    unlock: UnlockEngine,
    aggregator: ProgressAggregator,
    issuer: CertificateIssuer,
    estimator: CompletionEstimator,
}

impl BasicProgressTracker {
    /// Create a tracker with default configuration.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(storage, TrackerConfig::default())
    }

    /// Create a tracker with explicit configuration.
    pub fn with_config(storage: Arc<dyn Storage>, config: TrackerConfig) -> Self {
        Self {
            issuer: CertificateIssuer::new(storage.clone()),
            estimator: CompletionEstimator::new(config.hours_per_day),
            unlock: UnlockEngine,
            aggregator: ProgressAggregator,
            storage,
            config,
        }
    }

    /// Underlying storage.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Load and validate a course's catalog.
    pub async fn outline(&self, course: CourseId) -> Result<CourseOutline> {
        let course = self
            .storage
            .load_course(course)
            .await?
            .ok_or_else(|| ProgressError::NotFound(format!("course {}", course)))?;
        let sections = self.storage.list_sections(course.id).await?;
        let lessons = self.storage.list_lessons(course.id).await?;

        CourseOutline::build(course, sections, lessons)
    }

    async fn store(&self, student: StudentId, course: CourseId) -> Result<ProgressStore> {
        let records = self.storage.list_progress(student, course).await?;
        ProgressStore::from_records(student, records)
    }

    /// Resolve a lesson to itself and its section.
    async fn lesson_chain(&self, lesson: LessonId) -> Result<(Lesson, Section)> {
        let lesson = self
            .storage
            .load_lesson(lesson)
            .await?
            .ok_or_else(|| ProgressError::NotFound(format!("lesson {}", lesson)))?;
        let section = self.storage.load_section(lesson.section_id).await?.ok_or_else(|| {
            ProgressError::DataIntegrity(format!(
                "lesson {} references missing section {}",
                lesson.id, lesson.section_id
            ))
        })?;
        Ok((lesson, section))
    }

    /// Fail unless `item` belongs to the outline's course.
    async fn check_membership(&self, outline: &CourseOutline, item: ContentRef) -> Result<()> {
        let present = match item {
            ContentRef::Lesson(id) => outline.lesson(id).is_some(),
            ContentRef::Section(id) => outline.section(id).is_some(),
        };
        if present {
            return Ok(());
        }

        let exists = match item {
            ContentRef::Lesson(id) => self.storage.load_lesson(id).await?.is_some(),
            ContentRef::Section(id) => self.storage.load_section(id).await?.is_some(),
        };
        if exists {
            Err(ProgressError::DataIntegrity(format!(
                "{:?} is not part of course {}",
                item,
                outline.course().id
            )))
        } else {
            Err(ProgressError::NotFound(format!("{:?}", item)))
        }
    }

    /// Sequential courses are closed to students without an enrollment.
    async fn closed_to(&self, student: StudentId, outline: &CourseOutline) -> Result<bool> {
        if !self.config.require_enrollment || !outline.course().is_sequential {
            return Ok(false);
        }
        let enrolled = self.storage.is_enrolled(student, outline.course().id).await?;
        if !enrolled {
            debug!(%student, course = %outline.course().id, "Not enrolled; sequential course locked");
        }
        Ok(!enrolled)
    }

    /// Enroll a student in an existing course.
    pub async fn enroll(&self, student: StudentId, course: CourseId) -> Result<(Enrollment, bool)> {
        if self.storage.load_course(course).await?.is_none() {
            return Err(ProgressError::NotFound(format!("course {}", course)));
        }
        let (enrollment, created) = self.storage.enroll(student, course).await?;
        if created {
            info!(%student, %course, "Student enrolled");
        }
        Ok((enrollment, created))
    }

    /// Issue the course certificate if the student qualifies.
    pub async fn issue_if_eligible(&self, student: StudentId, course: CourseId) -> Result<Decision> {
        let outline = self.outline(course).await?;
        let store = self.store(student, course).await?;
        self.issuer.evaluate(student, &outline, &store).await
    }

    /// Progress of every section of a course.
    pub async fn section_progress(&self, student: StudentId, course: CourseId) -> Result<Vec<SectionProgress>> {
        let outline = self.outline(course).await?;
        let store = self.store(student, course).await?;
        Ok(self.aggregator.sections(&outline, &store))
    }

    /// Every lesson of a course with watched and lock state.
    pub async fn lesson_states(&self, student: StudentId, course: CourseId) -> Result<Vec<LessonState>> {
        let outline = self.outline(course).await?;
        let store = self.store(student, course).await?;
        let mut states = self.unlock.lesson_states(&outline, &store);
        if self.closed_to(student, &outline).await? {
            states.iter_mut().for_each(|s| s.is_locked = true);
        }
        Ok(states)
    }

    /// Every section of a course with completion and lock state.
    pub async fn section_states(&self, student: StudentId, course: CourseId) -> Result<Vec<SectionState>> {
        let outline = self.outline(course).await?;
        let store = self.store(student, course).await?;
        let mut states = self.unlock.section_states(&outline, &store);
        if self.closed_to(student, &outline).await? {
            states.iter_mut().for_each(|s| s.is_locked = true);
        }
        Ok(states)
    }

    /// Progress of every student enrolled in a course.
    pub async fn roster(&self, course: CourseId) -> Result<Vec<StudentProgress>> {
        let outline = self.outline(course).await?;
        let enrollments = self.storage.list_course_enrollments(course).await?;

        let mut roster = Vec::with_capacity(enrollments.len());
        for enrollment in enrollments {
            let store = self.store(enrollment.student, course).await?;
            roster.push(StudentProgress {
                student: enrollment.student,
                enrolled_at: enrollment.enrolled_at,
                progress: self.aggregator.course(&outline, &store),
            });
        }
        roster.sort_by(|a, b| a.enrolled_at.cmp(&b.enrolled_at));
        Ok(roster)
    }

    /// A student's totals across all enrollments.
    pub async fn learning_stats(&self, student: StudentId) -> Result<LearningStats> {
        let enrollments = self.storage.list_student_enrollments(student).await?;

        let mut hours_learned = 0.0;
        for enrollment in &enrollments {
            let outline = self.outline(enrollment.course).await?;
            let store = self.store(student, enrollment.course).await?;
            hours_learned += outline
                .lessons()
                .filter(|l| store.is_watched(l.lesson.id))
                .filter_map(|l| l.lesson.duration_hours)
                .sum::<f64>();
        }

        Ok(LearningStats {
            courses_enrolled: enrollments.len(),
            hours_learned,
            certificates: self.storage.list_certificates(student).await?.len(),
        })
    }

    /// The course of the student's most recently watched lesson, with an estimate.
    pub async fn resume(&self, student: StudentId) -> Result<Option<ResumeCourse>> {
        let Some(latest) = self.storage.latest_watched(student).await? else {
            return Ok(None);
        };
        let (_, section) = self.lesson_chain(latest.lesson).await?;
        let outline = self.outline(section.course_id).await?;
        let store = self.store(student, section.course_id).await?;

        let progress = self.aggregator.course(&outline, &store);
        let remaining_hours = self.estimator.remaining_hours(&progress);
        Ok(Some(ResumeCourse {
            course: outline.course().clone(),
            estimate: self.estimator.estimate(remaining_hours),
            remaining_hours,
            progress,
        }))
    }

    /// Projected finish time for a student in a course at the configured pace.
    pub async fn finish_by(&self, student: StudentId, course: CourseId) -> Result<Option<Time>> {
        let progress = self.get_progress(student, course).await?;
        let remaining = self.estimator.remaining_hours(&progress);
        Ok(self.estimator.finish_by(remaining, Utc::now()))
    }

    /// Administrative reset: drop a student's progress in a course.
    ///
    /// Certificates already issued are kept.
    pub async fn reset_progress(&self, student: StudentId, course: CourseId) -> Result<usize> {
        if self.storage.load_course(course).await?.is_none() {
            return Err(ProgressError::NotFound(format!("course {}", course)));
        }
        let removed = self.storage.delete_progress(student, course).await?;
        info!(%student, %course, removed, "Progress reset");
        Ok(removed)
    }
}

#[async_trait]
impl ProgressTracker for BasicProgressTracker {
    async fn is_locked(&self, student: StudentId, course: CourseId, item: ContentRef) -> Result<bool> {
        let outline = self.outline(course).await?;
        self.check_membership(&outline, item).await?;

        if !outline.course().is_sequential {
            return Ok(false);
        }
        if self.closed_to(student, &outline).await? {
            return Ok(true);
        }

        let store = self.store(student, course).await?;
        match item {
            ContentRef::Lesson(id) => self.unlock.is_lesson_locked(&outline, &store, id),
            ContentRef::Section(id) => self.unlock.is_section_locked(&outline, &store, id),
        }
    }

    async fn get_progress(&self, student: StudentId, course: CourseId) -> Result<Progress> {
        let outline = self.outline(course).await?;
        let store = self.store(student, course).await?;
        Ok(self.aggregator.course(&outline, &store))
    }

    async fn on_lesson_watched(&self, student: StudentId, lesson: LessonId) -> Result<WatchOutcome> {
        let (_, section) = self.lesson_chain(lesson).await?;
        let decision = self.issue_if_eligible(student, section.course_id).await?;

        Ok(WatchOutcome {
            certificate_issued: decision.issued(),
            decision,
        })
    }

    async fn mark_watched(&self, student: StudentId, lesson: LessonId, watched: bool) -> Result<MarkOutcome> {
        self.lesson_chain(lesson).await?;

        let upsert = self.storage.upsert_lesson_progress(student, lesson, watched).await?;
        debug!(%student, %lesson, watched, created = upsert.created, "Lesson progress recorded");

        let watch = if upsert.became_watched() {
            Some(self.on_lesson_watched(student, lesson).await?)
        } else {
            None
        };

        Ok(MarkOutcome { upsert, watch })
    }
}
