//! JSON file storage implementation.
//!
//! Stores one pretty-printed JSON file per record under the storage root.
//! Records with a natural key are named after it (`{student}_{lesson}.json`
//! for progress, `{student}_{course}.json` for enrollments and certificates),
//! so uniqueness per key falls out of the file layout. Writers are serialized
//! through a single lock; readers go straight to disk.
//!
//! The lock lives in this process only. A storage directory must not be
//! written by two processes at once; use the SQLite backend for that.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use lms_core::{
    Certificate, Course, CourseId, Enrollment, Lesson, LessonId, LessonProgress, Section,
    SectionId, StudentId,
};
use super::{ProgressUpsert, Result, Storage};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

const DIRS: [&str; 6] = [
    "courses",
    "sections",
    "lessons",
    "enrollments",
    "progress",
    "certificates",
];

/// File-based JSON storage backend.
#[derive(Clone)]
pub struct JsonStorage {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonStorage {
    /// Create storage, creating the record directories under `root` if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        for dir in DIRS {
            fs::create_dir_all(root.join(dir)).await?;
        }

        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn course_path(&self, id: CourseId) -> PathBuf {
        self.root.join("courses").join(format!("{}.json", id))
    }
    fn section_path(&self, id: SectionId) -> PathBuf {
        self.root.join("sections").join(format!("{}.json", id))
    }
    fn lesson_path(&self, id: LessonId) -> PathBuf {
        self.root.join("lessons").join(format!("{}.json", id))
    }
    fn enrollment_path(&self, student: StudentId, course: CourseId) -> PathBuf {
        self.root.join("enrollments").join(format!("{}_{}.json", student, course))
    }
    fn progress_path(&self, student: StudentId, lesson: LessonId) -> PathBuf {
        self.root.join("progress").join(format!("{}_{}.json", student, lesson))
    }
    fn certificate_path(&self, student: StudentId, course: CourseId) -> PathBuf {
        self.root.join("certificates").join(format!("{}_{}.json", student, course))
    }

    async fn lesson_ids(&self, course: CourseId) -> Result<HashSet<LessonId>> {
        Ok(self.list_lessons(course).await?.into_iter().map(|l| l.id).collect())
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_course(&self, course: &Course) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.course_path(course.id), course).await
    }

    async fn load_course(&self, id: CourseId) -> Result<Option<Course>> {
        read_json(&self.course_path(id)).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let mut courses: Vec<Course> = list_dir(&self.root.join("courses"), None).await?;
        courses.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(courses)
    }

    async fn save_section(&self, section: &Section) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.section_path(section.id), section).await
    }

    async fn load_section(&self, id: SectionId) -> Result<Option<Section>> {
        read_json(&self.section_path(id)).await
    }

    async fn list_sections(&self, course: CourseId) -> Result<Vec<Section>> {
        let all = list_dir(&self.root.join("sections"), None).await?;
        Ok(all.into_iter()
            .filter(|s: &Section| s.course_id == course)
            .collect())
    }

    async fn save_lesson(&self, lesson: &Lesson) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.lesson_path(lesson.id), lesson).await
    }

    async fn load_lesson(&self, id: LessonId) -> Result<Option<Lesson>> {
        read_json(&self.lesson_path(id)).await
    }

    async fn list_lessons(&self, course: CourseId) -> Result<Vec<Lesson>> {
        let sections: HashSet<SectionId> = self
            .list_sections(course)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let all = list_dir(&self.root.join("lessons"), None).await?;
        Ok(all.into_iter()
            .filter(|l: &Lesson| sections.contains(&l.section_id))
            .collect())
    }

    async fn enroll(&self, student: StudentId, course: CourseId) -> Result<(Enrollment, bool)> {
        let _guard = self.write_lock.lock().await;
        let path = self.enrollment_path(student, course);
        if let Some(existing) = read_json(&path).await? {
            return Ok((existing, false));
        }

        let enrollment = Enrollment::new(student, course);
        write_json(&path, &enrollment).await?;
        Ok((enrollment, true))
    }

    async fn is_enrolled(&self, student: StudentId, course: CourseId) -> Result<bool> {
        Ok(fs::try_exists(self.enrollment_path(student, course)).await?)
    }

    async fn list_student_enrollments(&self, student: StudentId) -> Result<Vec<Enrollment>> {
        let prefix = format!("{}_", student);
        list_dir(&self.root.join("enrollments"), Some(&prefix)).await
    }

    async fn list_course_enrollments(&self, course: CourseId) -> Result<Vec<Enrollment>> {
        let all = list_dir(&self.root.join("enrollments"), None).await?;
        Ok(all.into_iter()
            .filter(|e: &Enrollment| e.course == course)
            .collect())
    }

    async fn list_progress(&self, student: StudentId, course: CourseId) -> Result<Vec<LessonProgress>> {
        let lessons = self.lesson_ids(course).await?;
        let prefix = format!("{}_", student);
        let all = list_dir(&self.root.join("progress"), Some(&prefix)).await?;
        Ok(all.into_iter()
            .filter(|p: &LessonProgress| lessons.contains(&p.lesson))
            .collect())
    }

    async fn upsert_lesson_progress(
        &self,
        student: StudentId,
        lesson: LessonId,
        watched: bool,
    ) -> Result<ProgressUpsert> {
        let _guard = self.write_lock.lock().await;
        let path = self.progress_path(student, lesson);

        match read_json::<LessonProgress>(&path).await? {
            Some(mut record) => {
                let was_watched = record.watched;
                if was_watched != watched {
                    record.watched = watched;
                    write_json(&path, &record).await?;
                }
                Ok(ProgressUpsert { record, created: false, was_watched })
            }
            None => {
                let record = LessonProgress::new(student, lesson, watched);
                write_json(&path, &record).await?;
                debug!(%student, %lesson, watched, "Created lesson progress");
                Ok(ProgressUpsert { record, created: true, was_watched: false })
            }
        }
    }

    async fn latest_watched(&self, student: StudentId) -> Result<Option<LessonProgress>> {
        let prefix = format!("{}_", student);
        let all: Vec<LessonProgress> = list_dir(&self.root.join("progress"), Some(&prefix)).await?;
        Ok(all.into_iter()
            .filter(|p| p.watched)
            .max_by(|a, b| a.watched_at.cmp(&b.watched_at)))
    }

    async fn delete_progress(&self, student: StudentId, course: CourseId) -> Result<usize> {
        let lessons = self.lesson_ids(course).await?;
        let _guard = self.write_lock.lock().await;

        let mut removed = 0;
        for lesson in lessons {
            match fs::remove_file(self.progress_path(student, lesson)).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    async fn get_or_create_certificate(
        &self,
        student: StudentId,
        course: CourseId,
    ) -> Result<(Certificate, bool)> {
        let _guard = self.write_lock.lock().await;
        let path = self.certificate_path(student, course);
        if let Some(existing) = read_json(&path).await? {
            return Ok((existing, false));
        }

        let certificate = Certificate::new(student, course);
        write_json(&path, &certificate).await?;
        Ok((certificate, true))
    }

    async fn load_certificate(&self, student: StudentId, course: CourseId) -> Result<Option<Certificate>> {
        read_json(&self.certificate_path(student, course)).await
    }

    async fn list_certificates(&self, student: StudentId) -> Result<Vec<Certificate>> {
        let prefix = format!("{}_", student);
        let mut certificates: Vec<Certificate> =
            list_dir(&self.root.join("certificates"), Some(&prefix)).await?;
        certificates.sort_by(|a, b| a.issued_at.cmp(&b.issued_at));
        Ok(certificates)
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json.as_bytes()).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read every `.json` file in `dir`, optionally only those whose name starts with `prefix`.
async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path, prefix: Option<&str>) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Some(prefix) = prefix {
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix));
            if !matches {
                continue;
            }
        }
        if let Some(item) = read_json(&path).await? {
            items.push(item);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> (tempfile::TempDir, JsonStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    async fn seed_course(storage: &JsonStorage) -> (Course, Vec<Lesson>) {
        let course = Course::new("Ownership").sequential(true).with_certificate(true);
        let section = Section::new(course.id, "Basics", 1);
        let lessons = vec![
            Lesson::new(section.id, "Moves", 1),
            Lesson::new(section.id, "Borrows", 2),
        ];

        storage.save_course(&course).await.unwrap();
        storage.save_section(&section).await.unwrap();
        for lesson in &lessons {
            storage.save_lesson(lesson).await.unwrap();
        }
        (course, lessons)
    }

    #[tokio::test]
    async fn test_catalog_roundtrip() {
        let (_dir, storage) = storage().await;
        let (course, lessons) = seed_course(&storage).await;

        let loaded = storage.load_course(course.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Ownership");
        assert!(loaded.is_sequential);

        assert_eq!(storage.list_sections(course.id).await.unwrap().len(), 1);
        assert_eq!(storage.list_lessons(course.id).await.unwrap().len(), lessons.len());
        assert!(storage.list_lessons(CourseId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enroll_is_get_or_create() {
        let (_dir, storage) = storage().await;
        let (course, _) = seed_course(&storage).await;
        let student = StudentId::new();

        assert!(!storage.is_enrolled(student, course.id).await.unwrap());

        let (first, created) = storage.enroll(student, course.id).await.unwrap();
        assert!(created);
        let (second, created) = storage.enroll(student, course.id).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        assert!(storage.is_enrolled(student, course.id).await.unwrap());
        assert_eq!(storage.list_course_enrollments(course.id).await.unwrap().len(), 1);
        assert_eq!(storage.list_student_enrollments(student).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_record_per_lesson() {
        let (_dir, storage) = storage().await;
        let (course, lessons) = seed_course(&storage).await;
        let student = StudentId::new();

        let first = storage.upsert_lesson_progress(student, lessons[0].id, true).await.unwrap();
        assert!(first.created);
        assert!(first.became_watched());

        let again = storage.upsert_lesson_progress(student, lessons[0].id, true).await.unwrap();
        assert!(!again.created);
        assert!(!again.became_watched());
        assert_eq!(again.record.id, first.record.id);

        let unwatched = storage.upsert_lesson_progress(student, lessons[0].id, false).await.unwrap();
        assert!(unwatched.was_watched);
        assert!(!unwatched.record.watched);
        assert_eq!(unwatched.record.watched_at, first.record.watched_at);

        let progress = storage.list_progress(student, course.id).await.unwrap();
        assert_eq!(progress.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_create_once() {
        let (_dir, storage) = storage().await;
        let (_, lessons) = seed_course(&storage).await;
        let student = StudentId::new();
        let lesson = lessons[0].id;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.upsert_lesson_progress(student, lesson, true).await.unwrap()
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn test_certificate_get_or_create() {
        let (_dir, storage) = storage().await;
        let (course, _) = seed_course(&storage).await;
        let student = StudentId::new();

        let (first, created) = storage.get_or_create_certificate(student, course.id).await.unwrap();
        assert!(created);
        let (second, created) = storage.get_or_create_certificate(student, course.id).await.unwrap();
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(storage.list_certificates(student).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_latest_watched_and_delete() {
        let (_dir, storage) = storage().await;
        let (course, lessons) = seed_course(&storage).await;
        let student = StudentId::new();

        assert!(storage.latest_watched(student).await.unwrap().is_none());

        storage.upsert_lesson_progress(student, lessons[0].id, true).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        storage.upsert_lesson_progress(student, lessons[1].id, true).await.unwrap();

        let latest = storage.latest_watched(student).await.unwrap().unwrap();
        assert_eq!(latest.lesson, lessons[1].id);

        assert_eq!(storage.delete_progress(student, course.id).await.unwrap(), 2);
        assert!(storage.list_progress(student, course.id).await.unwrap().is_empty());
        assert_eq!(storage.delete_progress(student, course.id).await.unwrap(), 0);
    }
}
