//! Validated, ordered snapshot of a course catalog.

use std::collections::{HashMap, HashSet};
use lms_core::{Course, Lesson, LessonId, Section, SectionId};

use crate::error::{ProgressError, Result};

/// A lesson placed in course order.
#[derive(Debug, Clone)]
pub struct OutlineLesson {
    /// The lesson
    pub lesson: Lesson,

    /// 1-based index across the whole course (sections in order, then lessons in order)
    pub position: usize,
}

/// A section placed in course order, with its lessons sorted.
#[derive(Debug, Clone)]
pub struct OutlineSection {
    /// The section
    pub section: Section,

    /// 1-based index among the course's sections
    pub rank: usize,

    /// Lessons sorted by their `order`
    pub lessons: Vec<OutlineLesson>,
}

impl OutlineSection {
    /// Lesson IDs of this section, in order.
    pub fn lesson_ids(&self) -> impl Iterator<Item = &LessonId> {
        self.lessons.iter().map(|l| &l.lesson.id)
    }
}

/// A course with its sections and lessons, sorted and checked.
///
/// Building an outline is where ordering and ownership invariants are
/// enforced; everything downstream assumes a valid outline.
#[derive(Debug, Clone)]
pub struct CourseOutline {
    course: Course,
    sections: Vec<OutlineSection>,
    lesson_index: HashMap<LessonId, (usize, usize)>,
    section_index: HashMap<SectionId, usize>,
}

impl CourseOutline {
    /// Build an outline from unsorted catalog rows.
    pub fn build(course: Course, sections: Vec<Section>, lessons: Vec<Lesson>) -> Result<Self> {
        let mut sections = sections;
        sections.sort_by_key(|s| s.order);

        let mut seen_orders = HashSet::new();
        for section in &sections {
            if section.course_id != course.id {
                return Err(ProgressError::DataIntegrity(format!(
                    "section {} belongs to course {}, not {}",
                    section.id, section.course_id, course.id
                )));
            }
            if !seen_orders.insert(section.order) {
                return Err(ProgressError::DataIntegrity(format!(
                    "course {} has more than one section with order {}",
                    course.id, section.order
                )));
            }
        }

        let section_index: HashMap<SectionId, usize> = sections
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();

        let mut grouped: Vec<Vec<Lesson>> = vec![Vec::new(); sections.len()];
        for lesson in lessons {
            let Some(&idx) = section_index.get(&lesson.section_id) else {
                return Err(ProgressError::DataIntegrity(format!(
                    "lesson {} references section {} which is not part of course {}",
                    lesson.id, lesson.section_id, course.id
                )));
            };
            grouped[idx].push(lesson);
        }

        let mut outline_sections = Vec::with_capacity(sections.len());
        let mut lesson_index = HashMap::new();
        let mut position = 0;

        for (idx, (section, mut lessons)) in sections.into_iter().zip(grouped).enumerate() {
            lessons.sort_by_key(|l| l.order);
            if let Some(pair) = lessons.windows(2).find(|w| w[0].order == w[1].order) {
                return Err(ProgressError::DataIntegrity(format!(
                    "section {} has more than one lesson with order {}",
                    section.id, pair[0].order
                )));
            }

            let mut placed = Vec::with_capacity(lessons.len());
            for (lesson_idx, lesson) in lessons.into_iter().enumerate() {
                position += 1;
                lesson_index.insert(lesson.id, (idx, lesson_idx));
                placed.push(OutlineLesson { lesson, position });
            }

            outline_sections.push(OutlineSection {
                section,
                rank: idx + 1,
                lessons: placed,
            });
        }

        Ok(Self {
            course,
            sections: outline_sections,
            lesson_index,
            section_index,
        })
    }

    /// The course.
    pub fn course(&self) -> &Course {
        &self.course
    }

    /// Sections in order.
    pub fn sections(&self) -> &[OutlineSection] {
        &self.sections
    }

    /// All lessons in course order.
    pub fn lessons(&self) -> impl Iterator<Item = &OutlineLesson> {
        self.sections.iter().flat_map(|s| s.lessons.iter())
    }

    /// Look up a section.
    pub fn section(&self, id: SectionId) -> Option<&OutlineSection> {
        self.section_index.get(&id).map(|&i| &self.sections[i])
    }

    /// Look up a lesson.
    pub fn lesson(&self, id: LessonId) -> Option<&OutlineLesson> {
        self.lesson_index
            .get(&id)
            .map(|&(s, l)| &self.sections[s].lessons[l])
    }

    /// The section containing a lesson.
    pub fn section_of(&self, lesson: LessonId) -> Option<&OutlineSection> {
        self.lesson_index.get(&lesson).map(|&(s, _)| &self.sections[s])
    }

    /// Number of lessons in the course.
    pub fn total_lessons(&self) -> usize {
        self.lesson_index.len()
    }

    /// Sum of known lesson durations.
    pub fn total_hours(&self) -> f64 {
        self.lessons()
            .filter_map(|l| l.lesson.duration_hours)
            .sum()
    }
}
