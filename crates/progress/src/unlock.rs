//! Sequential access control for lessons and sections.
//!
//! In a sequential course a student may open the lesson right after the
//! furthest one they have watched, and the section right after the furthest
//! one they have fully completed. Lessons inside a locked section stay locked
//! even when the lesson rule alone would open them, so watching lessons out of
//! order through direct calls cannot skip a section.

use lms_core::{LessonId, SectionId};
use serde::Serialize;

use crate::error::{ProgressError, Result};
use crate::outline::{CourseOutline, OutlineSection};
use crate::store::ProgressStore;

/// Lock state of one lesson for one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonState {
    /// Lesson
    pub lesson: LessonId,
    /// Containing section
    pub section: SectionId,
    /// Lesson title
    pub title: String,
    /// Course-wide position
    pub position: usize,
    /// Student has watched it
    pub watched: bool,
    /// Student may not open it yet
    pub is_locked: bool,
}

/// Lock state of one section for one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionState {
    /// Section
    pub section: SectionId,
    /// Section title
    pub title: String,
    /// Rank among the course's sections
    pub rank: usize,
    /// Every lesson in it is watched (and it has at least one)
    pub completed: bool,
    /// Student may not open it yet
    pub is_locked: bool,
}

/// Precomputed frontier for one (student, course).
#[derive(Debug, Clone, Copy)]
struct Gate {
    sequential: bool,
    last_lesson: Option<usize>,
    last_section: Option<usize>,
}

impl Gate {
    fn section_locked(&self, rank: usize) -> bool {
        self.sequential && rank > self.last_section.map_or(1, |r| r + 1)
    }

    fn lesson_locked(&self, position: usize, rank: usize) -> bool {
        self.sequential
            && (position > self.last_lesson.map_or(1, |p| p + 1) || self.section_locked(rank))
    }
}

/// Computes lock state. Pure: reads an outline and a progress view, writes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlockEngine;

impl UnlockEngine {
    /// Position of the furthest watched lesson, if any.
    pub fn last_completed_position(&self, outline: &CourseOutline, store: &ProgressStore) -> Option<usize> {
        outline
            .lessons()
            .filter(|l| store.is_watched(l.lesson.id))
            .map(|l| l.position)
            .max()
    }

    /// Rank of the furthest fully completed section, if any.
    pub fn last_completed_section(&self, outline: &CourseOutline, store: &ProgressStore) -> Option<usize> {
        outline
            .sections()
            .iter()
            .filter(|s| self.is_section_completed(s, store))
            .map(|s| s.rank)
            .max()
    }

    /// A section is completed when it has lessons and all of them are watched.
    pub fn is_section_completed(&self, section: &OutlineSection, store: &ProgressStore) -> bool {
        !section.lessons.is_empty() && section.lessons.iter().all(|l| store.is_watched(l.lesson.id))
    }

    fn gate(&self, outline: &CourseOutline, store: &ProgressStore) -> Gate {
        let sequential = outline.course().is_sequential;
        if !sequential {
            return Gate { sequential, last_lesson: None, last_section: None };
        }
        Gate {
            sequential,
            last_lesson: self.last_completed_position(outline, store),
            last_section: self.last_completed_section(outline, store),
        }
    }

    /// Whether a lesson is locked.
    pub fn is_lesson_locked(
        &self,
        outline: &CourseOutline,
        store: &ProgressStore,
        lesson: LessonId,
    ) -> Result<bool> {
        let placed = outline.lesson(lesson).ok_or_else(|| {
            ProgressError::DataIntegrity(format!(
                "lesson {} is not part of course {}",
                lesson,
                outline.course().id
            ))
        })?;
        let rank = outline.section_of(lesson).map_or(1, |s| s.rank);

        Ok(self.gate(outline, store).lesson_locked(placed.position, rank))
    }

    /// Whether a section is locked.
    pub fn is_section_locked(
        &self,
        outline: &CourseOutline,
        store: &ProgressStore,
        section: SectionId,
    ) -> Result<bool> {
        let placed = outline.section(section).ok_or_else(|| {
            ProgressError::DataIntegrity(format!(
                "section {} is not part of course {}",
                section,
                outline.course().id
            ))
        })?;

        Ok(self.gate(outline, store).section_locked(placed.rank))
    }

    /// Every lesson of the course in order, with watched and lock state.
    pub fn lesson_states(&self, outline: &CourseOutline, store: &ProgressStore) -> Vec<LessonState> {
        let gate = self.gate(outline, store);
        outline
            .sections()
            .iter()
            .flat_map(|section| {
                section.lessons.iter().map(move |l| LessonState {
                    lesson: l.lesson.id,
                    section: section.section.id,
                    title: l.lesson.title.clone(),
                    position: l.position,
                    watched: store.is_watched(l.lesson.id),
                    is_locked: gate.lesson_locked(l.position, section.rank),
                })
            })
            .collect()
    }

    /// Every section of the course in order, with completion and lock state.
    pub fn section_states(&self, outline: &CourseOutline, store: &ProgressStore) -> Vec<SectionState> {
        let gate = self.gate(outline, store);
        outline
            .sections()
            .iter()
            .map(|s| SectionState {
                section: s.section.id,
                title: s.section.title.clone(),
                rank: s.rank,
                completed: self.is_section_completed(s, store),
                is_locked: gate.section_locked(s.rank),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::{Course, Lesson, LessonProgress, Section, StudentId};

    fn single_section(sequential: bool, n: u32) -> (CourseOutline, Vec<LessonId>) {
        let course = Course::new("Iterators").sequential(sequential);
        let section = Section::new(course.id, "All", 1);
        let lessons: Vec<Lesson> = (1..=n)
            .map(|i| Lesson::new(section.id, format!("L{i}"), i))
            .collect();
        let ids = lessons.iter().map(|l| l.id).collect();
        (CourseOutline::build(course, vec![section], lessons).unwrap(), ids)
    }

    fn watched(student: StudentId, lessons: &[LessonId]) -> ProgressStore {
        let records = lessons.iter().map(|&l| LessonProgress::new(student, l, true));
        ProgressStore::from_records(student, records).unwrap()
    }

    fn locked(outline: &CourseOutline, store: &ProgressStore) -> Vec<bool> {
        UnlockEngine.lesson_states(outline, store).iter().map(|s| s.is_locked).collect()
    }

    #[test]
    fn test_non_sequential_never_locks() {
        let (outline, ids) = single_section(false, 4);
        let student = StudentId::new();

        for k in 0..=ids.len() {
            let store = watched(student, &ids[..k]);
            assert_eq!(locked(&outline, &store), vec![false; 4]);
            let section = outline.sections()[0].section.id;
            assert!(!UnlockEngine.is_section_locked(&outline, &store, section).unwrap());
        }
    }

    #[test]
    fn test_only_first_lesson_open_without_progress() {
        let (outline, _) = single_section(true, 3);
        let store = ProgressStore::default();
        assert_eq!(locked(&outline, &store), vec![false, true, true]);
    }

    #[test]
    fn test_watching_k_opens_exactly_k_plus_one() {
        let n = 6;
        let (outline, ids) = single_section(true, n);
        let student = StudentId::new();

        for k in 1..=n as usize {
            let store = watched(student, &ids[..k]);
            for (i, id) in ids.iter().enumerate() {
                let position = i + 1;
                let expected_locked = position > k + 1;
                assert_eq!(
                    UnlockEngine.is_lesson_locked(&outline, &store, *id).unwrap(),
                    expected_locked,
                    "k={k} position={position}"
                );
            }
        }
    }

    #[test]
    fn test_furthest_watched_lesson_sets_frontier() {
        let (outline, ids) = single_section(true, 5);
        let store = watched(StudentId::new(), &[ids[2]]);
        assert_eq!(UnlockEngine.last_completed_position(&outline, &store), Some(3));
        assert_eq!(locked(&outline, &store), vec![false, false, false, false, true]);
    }

    fn two_sections() -> (CourseOutline, [LessonId; 3], [SectionId; 2]) {
        let course = Course::new("Errors").sequential(true);
        let a = Section::new(course.id, "A", 1);
        let b = Section::new(course.id, "B", 2);
        let a1 = Lesson::new(a.id, "a1", 1);
        let a2 = Lesson::new(a.id, "a2", 2);
        let b1 = Lesson::new(b.id, "b1", 1);
        let lessons = [a1.id, a2.id, b1.id];
        let sections = [a.id, b.id];
        let outline = CourseOutline::build(course, vec![a, b], vec![a1, a2, b1]).unwrap();
        (outline, lessons, sections)
    }

    #[test]
    fn test_next_section_waits_for_full_completion() {
        let (outline, [a1, a2, b1], [a, b]) = two_sections();
        let student = StudentId::new();

        let none = ProgressStore::default();
        assert!(!UnlockEngine.is_section_locked(&outline, &none, a).unwrap());
        assert!(UnlockEngine.is_section_locked(&outline, &none, b).unwrap());

        let partial = watched(student, &[a1]);
        assert!(UnlockEngine.is_section_locked(&outline, &partial, b).unwrap());
        assert!(UnlockEngine.is_lesson_locked(&outline, &partial, b1).unwrap());

        let done = watched(student, &[a1, a2]);
        assert!(!UnlockEngine.is_section_locked(&outline, &done, b).unwrap());
        assert!(!UnlockEngine.is_lesson_locked(&outline, &done, b1).unwrap());
    }

    #[test]
    fn test_out_of_order_watch_cannot_skip_section() {
        let (outline, [a1, a2, b1], [_, b]) = two_sections();
        let store = watched(StudentId::new(), &[a2]);

        assert!(!UnlockEngine.is_lesson_locked(&outline, &store, a1).unwrap());
        assert!(UnlockEngine.is_section_locked(&outline, &store, b).unwrap());
        assert!(UnlockEngine.is_lesson_locked(&outline, &store, b1).unwrap());
    }

    #[test]
    fn test_section_states_report_completion() {
        let (outline, [a1, a2, _], _) = two_sections();
        let store = watched(StudentId::new(), &[a1, a2]);

        let states = UnlockEngine.section_states(&outline, &store);
        assert_eq!(states.len(), 2);
        assert!(states[0].completed);
        assert!(!states[0].is_locked);
        assert!(!states[1].completed);
        assert!(!states[1].is_locked);
    }

    #[test]
    fn test_empty_section_never_counts_as_completed() {
        let course = Course::new("Gaps").sequential(true);
        let empty = Section::new(course.id, "Empty", 1);
        let next = Section::new(course.id, "Next", 2);
        let lesson = Lesson::new(next.id, "n1", 1);
        let outline = CourseOutline::build(course, vec![empty, next.clone()], vec![lesson]).unwrap();

        let store = ProgressStore::default();
        assert!(UnlockEngine.is_section_locked(&outline, &store, next.id).unwrap());
    }

    #[test]
    fn test_unknown_lesson_is_integrity_error() {
        let (outline, _) = single_section(true, 2);
        let err = UnlockEngine
            .is_lesson_locked(&outline, &ProgressStore::default(), LessonId::new())
            .unwrap_err();
        assert!(matches!(err, ProgressError::DataIntegrity(_)));
    }
}
