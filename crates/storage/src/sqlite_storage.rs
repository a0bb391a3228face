//! SQLite storage backend.
//!
//! Stores the catalog and student records in typed tables. Uniqueness of
//! (student, lesson) progress, (student, course) enrollments and (student,
//! course) certificates is enforced by table constraints, and the
//! get-or-create writes use `INSERT ... ON CONFLICT` inside a transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_core::{
    Certificate, Course, CourseId, Enrollment, Lesson, LessonId, LessonProgress, Section,
    SectionId, StudentId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use super::trait_::{ProgressUpsert, Result, Storage, StorageError};

const SCHEMA: [&str; 7] = [
    "CREATE TABLE IF NOT EXISTS courses (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        is_sequential INTEGER NOT NULL,
        has_certificate INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sections (
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        position INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS lessons (
        id TEXT PRIMARY KEY,
        section_id TEXT NOT NULL REFERENCES sections(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        position INTEGER NOT NULL,
        duration_hours REAL
    )",
    "CREATE TABLE IF NOT EXISTS enrollments (
        id TEXT PRIMARY KEY,
        student TEXT NOT NULL,
        course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        enrolled_at TEXT NOT NULL,
        UNIQUE (student, course_id)
    )",
    "CREATE TABLE IF NOT EXISTS lesson_progress (
        id TEXT PRIMARY KEY,
        student TEXT NOT NULL,
        lesson_id TEXT NOT NULL REFERENCES lessons(id) ON DELETE CASCADE,
        watched INTEGER NOT NULL,
        watched_at TEXT NOT NULL,
        UNIQUE (student, lesson_id)
    )",
    "CREATE TABLE IF NOT EXISTS certificates (
        id TEXT PRIMARY KEY,
        student TEXT NOT NULL,
        course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        issued_at TEXT NOT NULL,
        UNIQUE (student, course_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_lessons_section ON lessons(section_id)",
];

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if missing) a database file.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Create an in-memory SQLite storage for testing.
    pub async fn in_memory() -> Result<Self> {
        // Each connection to :memory: is its own database, so keep exactly one.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    // === Catalog ===

    async fn save_course(&self, course: &Course) -> Result<()> {
        sqlx::query(
            "INSERT INTO courses (id, title, is_sequential, has_certificate, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                is_sequential = excluded.is_sequential,
                has_certificate = excluded.has_certificate",
        )
        .bind(course.id.to_string())
        .bind(&course.title)
        .bind(course.is_sequential)
        .bind(course.has_certificate)
        .bind(course.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_course(&self, id: CourseId) -> Result<Option<Course>> {
        let row = sqlx::query("SELECT * FROM courses WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(course_from_row).transpose()
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let rows = sqlx::query("SELECT * FROM courses ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(course_from_row).collect()
    }

    async fn save_section(&self, section: &Section) -> Result<()> {
        sqlx::query(
            "INSERT INTO sections (id, course_id, title, position) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                title = excluded.title,
                position = excluded.position",
        )
        .bind(section.id.to_string())
        .bind(section.course_id.to_string())
        .bind(&section.title)
        .bind(section.order)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_section(&self, id: SectionId) -> Result<Option<Section>> {
        let row = sqlx::query("SELECT * FROM sections WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(section_from_row).transpose()
    }

    async fn list_sections(&self, course: CourseId) -> Result<Vec<Section>> {
        let rows = sqlx::query("SELECT * FROM sections WHERE course_id = ?")
            .bind(course.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(section_from_row).collect()
    }

    async fn save_lesson(&self, lesson: &Lesson) -> Result<()> {
        sqlx::query(
            "INSERT INTO lessons (id, section_id, title, position, duration_hours)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                section_id = excluded.section_id,
                title = excluded.title,
                position = excluded.position,
                duration_hours = excluded.duration_hours",
        )
        .bind(lesson.id.to_string())
        .bind(lesson.section_id.to_string())
        .bind(&lesson.title)
        .bind(lesson.order)
        .bind(lesson.duration_hours)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_lesson(&self, id: LessonId) -> Result<Option<Lesson>> {
        let row = sqlx::query("SELECT * FROM lessons WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(lesson_from_row).transpose()
    }

    async fn list_lessons(&self, course: CourseId) -> Result<Vec<Lesson>> {
        let rows = sqlx::query(
            "SELECT l.* FROM lessons l
            JOIN sections s ON s.id = l.section_id
            WHERE s.course_id = ?",
        )
        .bind(course.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(lesson_from_row).collect()
    }

    // === Enrollment ===

    async fn enroll(&self, student: StudentId, course: CourseId) -> Result<(Enrollment, bool)> {
        let candidate = Enrollment::new(student, course);
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO enrollments (id, student, course_id, enrolled_at) VALUES (?, ?, ?, ?)
            ON CONFLICT (student, course_id) DO NOTHING",
        )
        .bind(candidate.id.to_string())
        .bind(student.to_string())
        .bind(course.to_string())
        .bind(candidate.enrolled_at.to_rfc3339())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let row = sqlx::query("SELECT * FROM enrollments WHERE student = ? AND course_id = ?")
            .bind(student.to_string())
            .bind(course.to_string())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok((enrollment_from_row(&row)?, inserted == 1))
    }

    async fn is_enrolled(&self, student: StudentId, course: CourseId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM enrollments WHERE student = ? AND course_id = ?")
            .bind(student.to_string())
            .bind(course.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn list_student_enrollments(&self, student: StudentId) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query("SELECT * FROM enrollments WHERE student = ? ORDER BY enrolled_at")
            .bind(student.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(enrollment_from_row).collect()
    }

    async fn list_course_enrollments(&self, course: CourseId) -> Result<Vec<Enrollment>> {
        let rows = sqlx::query("SELECT * FROM enrollments WHERE course_id = ? ORDER BY enrolled_at")
            .bind(course.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(enrollment_from_row).collect()
    }

    // === Progress facts ===

    async fn list_progress(&self, student: StudentId, course: CourseId) -> Result<Vec<LessonProgress>> {
        let rows = sqlx::query(
            "SELECT p.* FROM lesson_progress p
            JOIN lessons l ON l.id = p.lesson_id
            JOIN sections s ON s.id = l.section_id
            WHERE p.student = ? AND s.course_id = ?",
        )
        .bind(student.to_string())
        .bind(course.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(progress_from_row).collect()
    }

    async fn upsert_lesson_progress(
        &self,
        student: StudentId,
        lesson: LessonId,
        watched: bool,
    ) -> Result<ProgressUpsert> {
        let candidate = LessonProgress::new(student, lesson, watched);
        let mut tx = self.pool.begin().await?;

        // The insert takes the write lock, so the read-then-update below
        // cannot interleave with another writer.
        let inserted = sqlx::query(
            "INSERT INTO lesson_progress (id, student, lesson_id, watched, watched_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (student, lesson_id) DO NOTHING",
        )
        .bind(candidate.id.to_string())
        .bind(student.to_string())
        .bind(lesson.to_string())
        .bind(watched)
        .bind(candidate.watched_at.to_rfc3339())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 1 {
            tx.commit().await?;
            debug!(%student, %lesson, watched, "Created lesson progress");
            return Ok(ProgressUpsert { record: candidate, created: true, was_watched: false });
        }

        let row = sqlx::query("SELECT * FROM lesson_progress WHERE student = ? AND lesson_id = ?")
            .bind(student.to_string())
            .bind(lesson.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let mut record = progress_from_row(&row)?;
        let was_watched = record.watched;

        if was_watched != watched {
            sqlx::query("UPDATE lesson_progress SET watched = ? WHERE id = ?")
                .bind(watched)
                .bind(record.id.to_string())
                .execute(&mut *tx)
                .await?;
            record.watched = watched;
        }
        tx.commit().await?;

        Ok(ProgressUpsert { record, created: false, was_watched })
    }

    async fn latest_watched(&self, student: StudentId) -> Result<Option<LessonProgress>> {
        let row = sqlx::query(
            "SELECT * FROM lesson_progress WHERE student = ? AND watched = 1
            ORDER BY watched_at DESC LIMIT 1",
        )
        .bind(student.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(progress_from_row).transpose()
    }

    async fn delete_progress(&self, student: StudentId, course: CourseId) -> Result<usize> {
        let removed = sqlx::query(
            "DELETE FROM lesson_progress WHERE student = ? AND lesson_id IN (
                SELECT l.id FROM lessons l
                JOIN sections s ON s.id = l.section_id
                WHERE s.course_id = ?
            )",
        )
        .bind(student.to_string())
        .bind(course.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(removed as usize)
    }

    // === Certificates ===

    async fn get_or_create_certificate(
        &self,
        student: StudentId,
        course: CourseId,
    ) -> Result<(Certificate, bool)> {
        let candidate = Certificate::new(student, course);
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO certificates (id, student, course_id, issued_at) VALUES (?, ?, ?, ?)
            ON CONFLICT (student, course_id) DO NOTHING",
        )
        .bind(candidate.id.to_string())
        .bind(student.to_string())
        .bind(course.to_string())
        .bind(candidate.issued_at.to_rfc3339())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let row = sqlx::query("SELECT * FROM certificates WHERE student = ? AND course_id = ?")
            .bind(student.to_string())
            .bind(course.to_string())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok((certificate_from_row(&row)?, inserted == 1))
    }

    async fn load_certificate(&self, student: StudentId, course: CourseId) -> Result<Option<Certificate>> {
        let row = sqlx::query("SELECT * FROM certificates WHERE student = ? AND course_id = ?")
            .bind(student.to_string())
            .bind(course.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(certificate_from_row).transpose()
    }

    async fn list_certificates(&self, student: StudentId) -> Result<Vec<Certificate>> {
        let rows = sqlx::query("SELECT * FROM certificates WHERE student = ? ORDER BY issued_at")
            .bind(student.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(certificate_from_row).collect()
    }
}

fn parse_id<T: FromStr>(row: &SqliteRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| StorageError::Corrupt(format!("{column}: invalid id {raw:?}")))
}

fn parse_time(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("{column}: {e}")))
}

fn course_from_row(row: &SqliteRow) -> Result<Course> {
    Ok(Course {
        id: parse_id(row, "id")?,
        title: row.try_get("title")?,
        is_sequential: row.try_get("is_sequential")?,
        has_certificate: row.try_get("has_certificate")?,
        created_at: parse_time(row, "created_at")?,
    })
}

fn section_from_row(row: &SqliteRow) -> Result<Section> {
    Ok(Section {
        id: parse_id(row, "id")?,
        course_id: parse_id(row, "course_id")?,
        title: row.try_get("title")?,
        order: row.try_get("position")?,
    })
}

fn lesson_from_row(row: &SqliteRow) -> Result<Lesson> {
    Ok(Lesson {
        id: parse_id(row, "id")?,
        section_id: parse_id(row, "section_id")?,
        title: row.try_get("title")?,
        order: row.try_get("position")?,
        duration_hours: row.try_get("duration_hours")?,
    })
}

fn enrollment_from_row(row: &SqliteRow) -> Result<Enrollment> {
    Ok(Enrollment {
        id: parse_id(row, "id")?,
        student: parse_id(row, "student")?,
        course: parse_id(row, "course_id")?,
        enrolled_at: parse_time(row, "enrolled_at")?,
    })
}

fn progress_from_row(row: &SqliteRow) -> Result<LessonProgress> {
    Ok(LessonProgress {
        id: parse_id(row, "id")?,
        student: parse_id(row, "student")?,
        lesson: parse_id(row, "lesson_id")?,
        watched: row.try_get("watched")?,
        watched_at: parse_time(row, "watched_at")?,
    })
}

fn certificate_from_row(row: &SqliteRow) -> Result<Certificate> {
    Ok(Certificate {
        id: parse_id(row, "id")?,
        student: parse_id(row, "student")?,
        course: parse_id(row, "course_id")?,
        issued_at: parse_time(row, "issued_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn seeded() -> (SqliteStorage, Course, Vec<Lesson>) {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let course = Course::new("Lifetimes").sequential(true).with_certificate(true);
        let section = Section::new(course.id, "Intro", 1);
        let lessons = vec![
            Lesson::new(section.id, "Scopes", 1).with_duration(0.5),
            Lesson::new(section.id, "Elision", 2),
        ];

        storage.save_course(&course).await.unwrap();
        storage.save_section(&section).await.unwrap();
        for lesson in &lessons {
            storage.save_lesson(lesson).await.unwrap();
        }
        (storage, course, lessons)
    }

    #[tokio::test]
    async fn test_catalog_operations() {
        let (storage, course, lessons) = seeded().await;

        let loaded = storage.load_course(course.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, course.title);
        assert!(loaded.has_certificate);

        let listed = storage.list_lessons(course.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        let first = storage.load_lesson(lessons[0].id).await.unwrap().unwrap();
        assert_eq!(first.duration_hours, Some(0.5));
        assert!(storage.load_course(CourseId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_progress_upsert_is_unique_per_lesson() {
        let (storage, course, lessons) = seeded().await;
        let student = StudentId::new();

        let first = storage.upsert_lesson_progress(student, lessons[0].id, true).await.unwrap();
        assert!(first.created);
        let second = storage.upsert_lesson_progress(student, lessons[0].id, true).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.record.id, first.record.id);

        let toggled = storage.upsert_lesson_progress(student, lessons[0].id, false).await.unwrap();
        assert!(toggled.was_watched);
        assert!(!toggled.record.watched);

        assert_eq!(storage.list_progress(student, course.id).await.unwrap().len(), 1);
        assert!(storage.latest_watched(student).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_certificate_unique_per_course() {
        let (storage, course, _) = seeded().await;
        let student = StudentId::new();

        let (first, created) = storage.get_or_create_certificate(student, course.id).await.unwrap();
        assert!(created);
        let (second, created) = storage.get_or_create_certificate(student, course.id).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(storage.list_certificates(student).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enroll_and_reset() {
        let (storage, course, lessons) = seeded().await;
        let student = StudentId::new();

        let (_, created) = storage.enroll(student, course.id).await.unwrap();
        assert!(created);
        let (_, created) = storage.enroll(student, course.id).await.unwrap();
        assert!(!created);
        assert!(storage.is_enrolled(student, course.id).await.unwrap());

        for lesson in &lessons {
            storage.upsert_lesson_progress(student, lesson.id, true).await.unwrap();
        }
        assert_eq!(storage.delete_progress(student, course.id).await.unwrap(), 2);
        assert!(storage.list_progress(student, course.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resaving_catalog_keeps_student_records() {
        let (storage, mut course, mut lessons) = seeded().await;
        let student = StudentId::new();
        storage.enroll(student, course.id).await.unwrap();
        storage.upsert_lesson_progress(student, lessons[0].id, true).await.unwrap();
        let (certificate, _) = storage.get_or_create_certificate(student, course.id).await.unwrap();

        course.title = "Lifetimes, revised".to_string();
        storage.save_course(&course).await.unwrap();
        let mut section = storage.list_sections(course.id).await.unwrap().remove(0);
        section.title = "Introduction".to_string();
        storage.save_section(&section).await.unwrap();
        lessons[0].title = "Scopes and blocks".to_string();
        lessons[0].duration_hours = Some(0.75);
        storage.save_lesson(&lessons[0]).await.unwrap();

        let loaded = storage.load_course(course.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Lifetimes, revised");
        assert_eq!(loaded.created_at, course.created_at);
        assert_eq!(storage.load_section(section.id).await.unwrap().unwrap().title, "Introduction");
        let lesson = storage.load_lesson(lessons[0].id).await.unwrap().unwrap();
        assert_eq!(lesson.title, "Scopes and blocks");
        assert_eq!(lesson.duration_hours, Some(0.75));

        assert_eq!(storage.list_sections(course.id).await.unwrap().len(), 1);
        assert_eq!(storage.list_lessons(course.id).await.unwrap().len(), 2);
        assert!(storage.is_enrolled(student, course.id).await.unwrap());
        let progress = storage.list_progress(student, course.id).await.unwrap();
        assert_eq!(progress.len(), 1);
        assert!(progress[0].watched);
        assert_eq!(
            storage.load_certificate(student, course.id).await.unwrap(),
            Some(certificate)
        );
    }

    async fn file_backed() -> (tempfile::TempDir, SqliteStorage, Course, LessonId) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new_from_path(&dir.path().join("lms.db")).await.unwrap();
        let course = Course::new("Traits").with_certificate(true);
        let section = Section::new(course.id, "Basics", 1);
        let lesson = Lesson::new(section.id, "impl blocks", 1);
        storage.save_course(&course).await.unwrap();
        storage.save_section(&section).await.unwrap();
        storage.save_lesson(&lesson).await.unwrap();
        (dir, storage, course, lesson.id)
    }

    #[tokio::test]
    async fn test_concurrent_upserts_create_once() {
        let (_dir, storage, course, lesson) = file_backed().await;
        let student = StudentId::new();

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
        assert_eq!(storage.list_progress(student, course.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_certificates_create_once() {
        let (_dir, storage, course, _) = file_backed().await;
        let student = StudentId::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.get_or_create_certificate(student, course.id).await.unwrap()
            }));
        }

        let mut ids = HashSet::new();
        let mut created = 0;
        for handle in handles {
            let (certificate, was_created) = handle.await.unwrap();
            ids.insert(certificate.id);
            if was_created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_health_check() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        assert!(storage.health_check().await);
    }
}
