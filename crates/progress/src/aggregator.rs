//! Completion statistics for courses and sections.

use lms_core::{SectionId, Time};
use serde::Serialize;

use crate::outline::{CourseOutline, OutlineLesson, OutlineSection};
use crate::store::ProgressStore;

/// Completion figures for a scope (course or section).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    /// Watched lessons in scope
    pub completed: usize,

    /// Lessons in scope
    pub total: usize,

    /// `100 * completed / total`, rounded to 2 decimals; 0 when there are no lessons
    pub percentage: f64,

    /// Latest `watched_at` among the student's records in scope
    pub last_accessed: Option<Time>,

    /// Sum of known lesson durations in scope
    pub total_hours: f64,
}

impl Progress {
    /// Every lesson in scope is watched and there is at least one.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} lessons", self.completed, self.total)
    }
}

/// Progress of one section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionProgress {
    /// Section
    pub section: SectionId,

    /// Section title
    pub title: String,

    /// Rank among the course's sections
    pub rank: usize,

    /// Figures
    #[serde(flatten)]
    pub progress: Progress,
}

/// Computes [`Progress`] from an outline and a student's facts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressAggregator;

impl ProgressAggregator {
    /// `round(100 * completed / total, 2)`, or 0 for an empty scope.
    pub fn percentage(completed: usize, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let raw = 100.0 * completed as f64 / total as f64;
        (raw * 100.0).round() / 100.0
    }

    /// Progress across the whole course.
    pub fn course(&self, outline: &CourseOutline, store: &ProgressStore) -> Progress {
        summarize(outline.lessons(), store)
    }

    /// Progress within one section.
    pub fn section(&self, section: &OutlineSection, store: &ProgressStore) -> Progress {
        summarize(section.lessons.iter(), store)
    }

    /// Progress of every section, in order.
    pub fn sections(&self, outline: &CourseOutline, store: &ProgressStore) -> Vec<SectionProgress> {
        outline
            .sections()
            .iter()
            .map(|s| SectionProgress {
                section: s.section.id,
                title: s.section.title.clone(),
                rank: s.rank,
                progress: self.section(s, store),
            })
            .collect()
    }
}

fn summarize<'a>(lessons: impl Iterator<Item = &'a OutlineLesson>, store: &ProgressStore) -> Progress {
    let mut completed = 0;
    let mut total = 0;
    let mut total_hours = 0.0;
    let mut last_accessed: Option<Time> = None;

    for placed in lessons {
        let lesson = &placed.lesson;
        total += 1;
        total_hours += lesson.duration_hours.unwrap_or(0.0);

        if let Some(record) = store.record(lesson.id) {
            if record.watched {
                completed += 1;
            }
            last_accessed = last_accessed.max(Some(record.watched_at));
        }
    }

    Progress {
        completed,
        total,
        percentage: ProgressAggregator::percentage(completed, total),
        last_accessed,
        total_hours,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lms_core::{Course, Lesson, LessonId, LessonProgress, Section, StudentId};

    fn outline() -> (CourseOutline, Vec<LessonId>) {
        let course = Course::new("Collections");
        let a = Section::new(course.id, "Vec", 1);
        let b = Section::new(course.id, "Map", 2);
        let lessons = vec![
            Lesson::new(a.id, "push", 1).with_duration(0.5),
            Lesson::new(a.id, "pop", 2).with_duration(0.25),
            Lesson::new(b.id, "insert", 1).with_duration(1.0),
        ];
        let ids = lessons.iter().map(|l| l.id).collect();
        (CourseOutline::build(course, vec![a, b], lessons).unwrap(), ids)
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(ProgressAggregator::percentage(1, 3), 33.33);
        assert_eq!(ProgressAggregator::percentage(2, 3), 66.67);
        assert_eq!(ProgressAggregator::percentage(3, 3), 100.0);
        assert_eq!(ProgressAggregator::percentage(0, 7), 0.0);
    }

    #[test]
    fn test_empty_scope_is_zero() {
        assert_eq!(ProgressAggregator::percentage(0, 0), 0.0);

        let course = Course::new("Empty");
        let outline = CourseOutline::build(course, vec![], vec![]).unwrap();
        let progress = ProgressAggregator.course(&outline, &ProgressStore::default());
        assert_eq!(progress.total, 0);
        assert_eq!(progress.percentage, 0.0);
        assert!(progress.last_accessed.is_none());
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_percentage_is_monotonic() {
        let (outline, ids) = outline();
        let student = StudentId::new();
        let mut previous = -1.0;

        for k in 0..=ids.len() {
            let records = ids[..k].iter().map(|&l| LessonProgress::new(student, l, true));
            let store = ProgressStore::from_records(student, records).unwrap();
            let progress = ProgressAggregator.course(&outline, &store);
            assert!(progress.percentage >= previous);
            previous = progress.percentage;
        }
        assert_eq!(previous, 100.0);
    }

    #[test]
    fn test_section_sums_match_course() {
        let (outline, ids) = outline();
        let student = StudentId::new();
        let records = [ids[0], ids[2]].map(|l| LessonProgress::new(student, l, true));
        let store = ProgressStore::from_records(student, records).unwrap();

        let course = ProgressAggregator.course(&outline, &store);
        let sections = ProgressAggregator.sections(&outline, &store);

        let completed: usize = sections.iter().map(|s| s.progress.completed).sum();
        let total: usize = sections.iter().map(|s| s.progress.total).sum();
        assert_eq!(completed, course.completed);
        assert_eq!(total, course.total);
        assert_eq!(sections[0].progress.percentage, 50.0);
        assert_eq!(sections[1].progress.percentage, 100.0);
        assert_eq!(course.total_hours, 1.75);
        assert_eq!(course.to_string(), "2/3 lessons");
    }

    #[test]
    fn test_last_accessed_is_latest_record() {
        let (outline, ids) = outline();
        let student = StudentId::new();
        let first = LessonProgress::new(student, ids[0], true);
        let mut later = LessonProgress::new(student, ids[1], false);
        later.watched_at = first.watched_at + Duration::hours(1);

        let store = ProgressStore::from_records(student, [first, later.clone()]).unwrap();
        let progress = ProgressAggregator.course(&outline, &store);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.last_accessed, Some(later.watched_at));
    }
}
