//! Time-window filter applied to posts before aggregation.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};

/// Creation-date cutoff for posts counted in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// Every post counts
    AllTime,
    /// Posts created at or after `since`
    PastDays { days: i64, since: DateTime<Utc> },
}

impl TimeWindow {
    pub fn all_time() -> Self {
        TimeWindow::AllTime
    }

    /// Window covering the `days` days before `now`.
    ///
    /// `days` must be at least 1.
    pub fn past_days(days: i64, now: DateTime<Utc>) -> Result<Self> {
        if days <= 0 {
            return Err(Error::InvalidWindow(days));
        }
        let since = Duration::try_days(days)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or(Error::InvalidWindow(days))?;
        Ok(TimeWindow::PastDays { days, since })
    }

    /// Window starting at an explicit cutoff, labelled with `days`.
    pub fn since(since: DateTime<Utc>, days: i64) -> Self {
        TimeWindow::PastDays { days, since }
    }

    /// Whether a post created at `created` falls inside the window.
    /// The cutoff itself is inside.
    pub fn includes(&self, created: DateTime<Utc>) -> bool {
        match self {
            TimeWindow::AllTime => true,
            TimeWindow::PastDays { since, .. } => created >= *since,
        }
    }

    /// Number of days covered, `None` for all time.
    pub fn days(&self) -> Option<i64> {
        match self {
            TimeWindow::AllTime => None,
            TimeWindow::PastDays { days, .. } => Some(*days),
        }
    }

    /// Earliest creation date counted, `None` for all time.
    pub fn cutoff(&self) -> Option<DateTime<Utc>> {
        match self {
            TimeWindow::AllTime => None,
            TimeWindow::PastDays { since, .. } => Some(*since),
        }
    }

    /// Human-readable description for summaries.
    pub fn display_name(&self) -> String {
        match self {
            TimeWindow::AllTime => "all time".to_string(),
            TimeWindow::PastDays { days: 1, .. } => "past day".to_string(),
            TimeWindow::PastDays { days, .. } => format!("past {} days", days),
        }
    }
}
