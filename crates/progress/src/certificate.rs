//! Certificate issuance on full course completion.

use std::sync::Arc;
use lms_core::{Certificate, Course, StudentId};
use lms_storage::Storage;
use tracing::{debug, info, warn};

use crate::aggregator::{Progress, ProgressAggregator};
use crate::error::Result;
use crate::outline::CourseOutline;
use crate::store::ProgressStore;

/// Outcome of evaluating a student for a course certificate.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// A certificate was created by this evaluation
    Issued(Certificate),
    /// The certificate already existed; nothing was written
    AlreadyIssued(Certificate),
    /// The course does not award certificates
    NoCertificate,
    /// The student is not enrolled; declined
    NotEnrolled,
    /// Lessons remain
    Incomplete {
        /// Watched lessons
        completed: usize,
        /// Lessons in the course
        total: usize,
    },
}

impl Decision {
    /// A certificate was created by this evaluation.
    pub fn issued(&self) -> bool {
        matches!(self, Decision::Issued(_))
    }

    /// The certificate held after evaluation, new or existing.
    pub fn certificate(&self) -> Option<&Certificate> {
        match self {
            Decision::Issued(c) | Decision::AlreadyIssued(c) => Some(c),
            _ => None,
        }
    }
}

/// Issues at most one certificate per (student, course).
///
/// Not Issued → Issued happens once; re-evaluating afterwards returns the
/// stored record. Uniqueness rests on the storage backend's atomic
/// get-or-create.
#[derive(Clone)]
pub struct CertificateIssuer {
    storage: Arc<dyn Storage>,
    aggregator: ProgressAggregator,
}

impl CertificateIssuer {
    /// Create a new issuer.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            aggregator: ProgressAggregator,
        }
    }

    /// Completion precondition, ignoring enrollment.
    pub fn is_eligible(course: &Course, progress: &Progress) -> bool {
        course.has_certificate && progress.is_complete()
    }

    /// Evaluate and, when eligible, issue.
    pub async fn evaluate(
        &self,
        student: StudentId,
        outline: &CourseOutline,
        store: &ProgressStore,
    ) -> Result<Decision> {
        let course = outline.course();

        if !self.storage.is_enrolled(student, course.id).await? {
            warn!(%student, course = %course.id, "Student is not enrolled; certificate declined");
            return Ok(Decision::NotEnrolled);
        }

        if !course.has_certificate {
            return Ok(Decision::NoCertificate);
        }

        let progress = self.aggregator.course(outline, store);
        if !Self::is_eligible(course, &progress) {
            debug!(%student, course = %course.id, %progress, "Not yet eligible for certificate");
            return Ok(Decision::Incomplete {
                completed: progress.completed,
                total: progress.total,
            });
        }

        let (certificate, created) = self.storage.get_or_create_certificate(student, course.id).await?;
        if created {
            info!(%student, course = %course.id, certificate = %certificate.id, "Certificate issued");
            Ok(Decision::Issued(certificate))
        } else {
            Ok(Decision::AlreadyIssued(certificate))
        }
    }
}
