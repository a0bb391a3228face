//! Completion time estimation.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::aggregator::Progress;

/// Human-scale estimate of the time left in a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Estimate {
    /// Nothing left
    Done,
    /// Under one day at the configured pace
    LessThanADay,
    /// Whole days
    Days(u32),
    /// Whole weeks
    Weeks(u32),
    /// Whole months (30 days)
    Months(u32),
}

impl std::fmt::Display for Estimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Estimate::Done => write!(f, "Done"),
            Estimate::LessThanADay => write!(f, "Less than a day"),
            Estimate::Days(n) => write!(f, "{} days", n),
            Estimate::Weeks(n) => write!(f, "{} weeks", n),
            Estimate::Months(n) => write!(f, "{} months", n),
        }
    }
}

/// Completion time estimator.
#[derive(Debug, Clone, Copy)]
pub struct CompletionEstimator {
    hours_per_day: f64,
}

impl CompletionEstimator {
    /// Create an estimator for a learning pace in hours per day.
    pub fn new(hours_per_day: f64) -> Self {
        Self { hours_per_day }
    }

    /// Hours left, assuming remaining lessons are proportional to remaining time.
    pub fn remaining_hours(&self, progress: &Progress) -> f64 {
        if progress.total == 0 {
            return 0.0;
        }
        let remaining_ratio = 1.0 - progress.completed as f64 / progress.total as f64;
        (progress.total_hours * remaining_ratio * 100.0).round() / 100.0
    }

    /// Bucket remaining hours into days, weeks or months at this pace.
    pub fn estimate(&self, remaining_hours: f64) -> Estimate {
        if remaining_hours <= 0.0 {
            return Estimate::Done;
        }
        if self.hours_per_day <= 0.0 {
            return Estimate::Months(u32::MAX);
        }

        let days = remaining_hours / self.hours_per_day;
        if days < 1.0 {
            Estimate::LessThanADay
        } else if days < 7.0 {
            Estimate::Days(days as u32)
        } else if days < 30.0 {
            Estimate::Weeks((days / 7.0) as u32)
        } else {
            Estimate::Months((days / 30.0) as u32)
        }
    }

    /// Projected finish time from `now` at this pace.
    ///
    /// `None` when the pace is zero or the date would fall outside the
    /// representable range.
    pub fn finish_by(&self, remaining_hours: f64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if remaining_hours <= 0.0 {
            return Some(now);
        }
        if self.hours_per_day <= 0.0 {
            return None;
        }

        let minutes = (remaining_hours / self.hours_per_day * 24.0 * 60.0).ceil() as i64;
        now.checked_add_signed(Duration::try_minutes(minutes)?)
    }
}

impl Default for CompletionEstimator {
    fn default() -> Self {
        Self::new(1.0)
    }
}
