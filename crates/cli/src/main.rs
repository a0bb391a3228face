//! LMS CLI - course catalog, sequential unlocking and progress tracking.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use lms_core::{Course, CourseId, Lesson, LessonId, Section, SectionId, StudentId};
use lms_progress::{BasicProgressTracker, ContentRef, Decision, ProgressTracker};
use lms_storage::{JsonStorage, Storage};

use crate::config::{Backend, Config, Overrides};

#[derive(Parser)]
#[command(name = "lms")]
#[command(about = "Course progress tracking with sequential unlocking", long_about = None)]
struct Cli {
    /// Storage directory
    #[arg(long, env = "LMS_STORAGE", global = true)]
    storage: Option<PathBuf>,

    /// Storage backend
    #[arg(long, env = "LMS_BACKEND", value_enum, global = true)]
    backend: Option<Backend>,

    /// Log filter (e.g. "info", "lms_progress=debug")
    #[arg(long, env = "LMS_LOG", global = true)]
    log: Option<String>,

    /// Config file
    #[arg(long, default_value = "lms.toml", global = true)]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage courses
    Course {
        #[command(subcommand)]
        command: CourseCommand,
    },
    /// Manage sections
    Section {
        #[command(subcommand)]
        command: SectionCommand,
    },
    /// Manage lessons
    Lesson {
        #[command(subcommand)]
        command: LessonCommand,
    },
    /// Print a fresh student id
    NewStudent,
    /// Enroll a student in a course
    Enroll {
        student: StudentId,
        course: CourseId,
    },
    /// Mark a lesson watched
    Watch {
        student: StudentId,
        lesson: LessonId,
    },
    /// Mark a lesson not watched
    Unwatch {
        student: StudentId,
        lesson: LessonId,
    },
    /// Check whether a lesson or section is locked
    Locked {
        student: StudentId,
        course: CourseId,
        /// Lesson to check
        #[arg(long, conflicts_with = "section", required_unless_present = "section")]
        lesson: Option<LessonId>,
        /// Section to check
        #[arg(long)]
        section: Option<SectionId>,
    },
    /// Show course progress
    Progress {
        student: StudentId,
        course: CourseId,
        /// Break down by section
        #[arg(long)]
        sections: bool,
    },
    /// Show every section and lesson with its lock state
    Outline {
        student: StudentId,
        course: CourseId,
    },
    /// Show progress of every enrolled student
    Roster {
        course: CourseId,
    },
    /// Show a student's learning totals
    Stats {
        student: StudentId,
    },
    /// Show the course to continue and time left
    Resume {
        student: StudentId,
    },
    /// List a student's certificates, issuing any that are due
    Certificates {
        student: StudentId,
    },
    /// Clear a student's progress in a course
    Reset {
        student: StudentId,
        course: CourseId,
    },
}

#[derive(Subcommand)]
enum CourseCommand {
    /// Create a course
    Add {
        title: String,
        /// Lessons and sections unlock in order
        #[arg(long)]
        sequential: bool,
        /// Award a certificate on completion
        #[arg(long)]
        certificate: bool,
    },
    /// List courses
    List,
}

#[derive(Subcommand)]
enum SectionCommand {
    /// Add a section to a course
    Add {
        course: CourseId,
        title: String,
        /// Position among the course's sections
        #[arg(long)]
        order: u32,
    },
}

#[derive(Subcommand)]
enum LessonCommand {
    /// Add a lesson to a section
    Add {
        section: SectionId,
        title: String,
        /// Position within the section
        #[arg(long)]
        order: u32,
        /// Duration in hours
        #[arg(long)]
        hours: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::resolve(
        Overrides {
            storage: cli.storage.clone(),
            backend: cli.backend,
            log_level: cli.log.clone(),
        },
        &cli.config,
    )?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    debug!(storage = %config.storage.display(), backend = ?config.backend, "Configuration resolved");

    let storage = open_storage(&config).await?;
    let tracker = BasicProgressTracker::with_config(storage.clone(), config.tracker.clone());

    run(cli.command, cli.json, storage, tracker).await
}

async fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    match config.backend {
        Backend::Json => Ok(Arc::new(JsonStorage::new(&config.storage).await?)),
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => {
            tokio::fs::create_dir_all(&config.storage).await?;
            let path = config.storage.join("lms.db");
            Ok(Arc::new(lms_storage::SqliteStorage::new_from_path(&path).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        Backend::Sqlite => bail!("the sqlite backend is not compiled in; rebuild with --features sqlite"),
    }
}

async fn run(
    command: Commands,
    json: bool,
    storage: Arc<dyn Storage>,
    tracker: BasicProgressTracker,
) -> Result<()> {
    match command {
        Commands::Course { command } => match command {
            CourseCommand::Add { title, sequential, certificate } => {
                let course = Course::new(title).sequential(sequential).with_certificate(certificate);
                storage.save_course(&course).await?;
                emit(json, &course, || println!("Added course: {} - {}", course.id, course.title))?;
            }
            CourseCommand::List => {
                let courses = storage.list_courses().await?;
                emit(json, &courses, || {
                    println!("Courses ({})", courses.len());
                    for c in &courses {
                        println!("  {} | {}{} - {}",
                            c.id,
                            if c.is_sequential { "SEQ" } else { "OPEN" },
                            if c.has_certificate { " +CERT" } else { "" },
                            c.title,
                        );
                    }
                })?;
            }
        },
        Commands::Section { command: SectionCommand::Add { course, title, order } } => {
            if storage.load_course(course).await?.is_none() {
                bail!("course {} not found", course);
            }
            let section = Section::new(course, title, order);
            storage.save_section(&section).await?;
            emit(json, &section, || println!("Added section: {} - {}", section.id, section.title))?;
        }
        Commands::Lesson { command: LessonCommand::Add { section, title, order, hours } } => {
            if storage.load_section(section).await?.is_none() {
                bail!("section {} not found", section);
            }
            let mut lesson = Lesson::new(section, title, order);
            if let Some(hours) = hours {
                lesson = lesson.with_duration(hours);
            }
            storage.save_lesson(&lesson).await?;
            emit(json, &lesson, || println!("Added lesson: {} - {}", lesson.id, lesson.title))?;
        }
        Commands::NewStudent => {
            let student = StudentId::new();
            emit(json, &student, || println!("{}", student))?;
        }
        Commands::Enroll { student, course } => {
            let (enrollment, created) = tracker.enroll(student, course).await?;
            emit(json, &enrollment, || {
                if created {
                    println!("Enrolled {} in {}", student, course);
                } else {
                    println!("Already enrolled since {}", enrollment.enrolled_at);
                }
            })?;
        }
        Commands::Watch { student, lesson } => mark(&tracker, json, student, lesson, true).await?,
        Commands::Unwatch { student, lesson } => mark(&tracker, json, student, lesson, false).await?,
        Commands::Locked { student, course, lesson, section } => {
            let item = match (lesson, section) {
                (Some(l), _) => ContentRef::Lesson(l),
                (None, Some(s)) => ContentRef::Section(s),
                (None, None) => return Err(anyhow!("pass --lesson or --section")),
            };
            let locked = tracker.is_locked(student, course, item).await?;
            emit(json, &serde_json::json!({ "is_locked": locked }), || {
                println!("{}", if locked { "locked" } else { "unlocked" })
            })?;
        }
        Commands::Progress { student, course, sections } => {
            let progress = tracker.get_progress(student, course).await?;
            if sections {
                let by_section = tracker.section_progress(student, course).await?;
                emit(json, &serde_json::json!({ "course": progress, "sections": by_section }), || {
                    println!("Course: {} ({:.2}%)", progress, progress.percentage);
                    for s in &by_section {
                        println!("  {}. {} - {} ({:.2}%)", s.rank, s.title, s.progress, s.progress.percentage);
                    }
                })?;
            } else {
                emit(json, &progress, || {
                    println!("{} ({:.2}%)", progress, progress.percentage);
                    if let Some(at) = progress.last_accessed {
                        println!("Last accessed: {}", at);
                    }
                })?;
            }
        }
        Commands::Outline { student, course } => {
            let sections = tracker.section_states(student, course).await?;
            let lessons = tracker.lesson_states(student, course).await?;
            emit(json, &serde_json::json!({ "sections": sections, "lessons": lessons }), || {
                for s in &sections {
                    println!("{} {}. {}", lock_mark(s.is_locked), s.rank, s.title);
                    for l in lessons.iter().filter(|l| l.section == s.section) {
                        println!("    {} {:>3} {}{}",
                            lock_mark(l.is_locked),
                            l.position,
                            l.title,
                            if l.watched { " (watched)" } else { "" },
                        );
                    }
                }
            })?;
        }
        Commands::Roster { course } => {
            let roster = tracker.roster(course).await?;
            emit(json, &roster, || {
                println!("Students ({})", roster.len());
                for entry in &roster {
                    println!("  {} | {} ({:.2}%)", entry.student, entry.progress, entry.progress.percentage);
                }
            })?;
        }
        Commands::Stats { student } => {
            let stats = tracker.learning_stats(student).await?;
            emit(json, &stats, || {
                println!("Courses enrolled: {}", stats.courses_enrolled);
                println!("Hours learned: {:.2}", stats.hours_learned);
                println!("Certificates: {}", stats.certificates);
            })?;
        }
        Commands::Resume { student } => {
            let Some(resume) = tracker.resume(student).await? else {
                emit(json, &serde_json::Value::Null, || println!("Nothing watched yet"))?;
                return Ok(());
            };
            let finish_by = tracker.finish_by(student, resume.course.id).await?;
            emit(json, &serde_json::json!({ "resume": resume, "finish_by": finish_by }), || {
                println!("Continue: {} - {}", resume.course.id, resume.course.title);
                println!("  Progress: {} ({:.2}%)", resume.progress, resume.progress.percentage);
                println!("  Remaining: {:.2} hours ({})", resume.remaining_hours, resume.estimate);
                if let Some(at) = finish_by {
                    println!("  Finish by: {}", at);
                }
            })?;
        }
        Commands::Certificates { student } => {
            for enrollment in storage.list_student_enrollments(student).await? {
                if let Decision::Issued(c) = tracker.issue_if_eligible(student, enrollment.course).await? {
                    debug!(certificate = %c.id, "Issued during reconcile");
                }
            }
            let certificates = storage.list_certificates(student).await?;
            emit(json, &certificates, || {
                println!("Certificates ({})", certificates.len());
                for c in &certificates {
                    println!("  {} | course {} | {}", c.id, c.course, c.issued_at);
                }
            })?;
        }
        Commands::Reset { student, course } => {
            let removed = tracker.reset_progress(student, course).await?;
            emit(json, &serde_json::json!({ "removed": removed }), || {
                println!("Removed {} progress records", removed)
            })?;
        }
    }

    Ok(())
}

async fn mark(
    tracker: &BasicProgressTracker,
    json: bool,
    student: StudentId,
    lesson: LessonId,
    watched: bool,
) -> Result<()> {
    let outcome = tracker.mark_watched(student, lesson, watched).await?;
    let record = &outcome.upsert.record;
    let certificate = outcome.watch.as_ref().and_then(|w| w.decision.certificate());

    emit(json, &serde_json::json!({ "progress": record, "certificate": certificate }), || {
        println!("Lesson {} {}", lesson, if record.watched { "watched" } else { "unwatched" });
        if let (true, Some(c)) = (outcome.certificate_issued(), certificate) {
            println!("Certificate issued: {}", c.id);
        }
    })
}

/// Print `value` as JSON, or run `text` for the human-readable form.
fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce()) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text();
    }
    Ok(())
}

fn lock_mark(locked: bool) -> &'static str {
    if locked { "[locked]" } else { "[open]  " }
}
