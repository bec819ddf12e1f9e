//! CSV report emitter
//!
//! Writes ranked [`TagMetrics`] rows to a dated CSV file. The file appears
//! under its final name only once it is complete.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::analytics::TagMetrics;
use crate::error::{Error, Result};
use crate::format::{format_date_opt, format_day};
use crate::snapshot::persist_atomically;

/// Report columns, in order.
pub const HEADER: &[&str] = &[
    "tag_name",
    "question_count",
    "answer_count",
    "answered_question_count",
    "unanswered_question_count",
    "total_score",
    "total_views",
    "unique_contributor_count",
    "webhook_count",
    "watcher_count",
    "last_activity_date",
    "article_count",
    "accepted_answer_count",
    "unique_asker_count",
    "unique_answerer_count",
    "sme_count",
    "sme_answer_count",
    "median_answer_time_hours",
    "self_answered_question_count",
    "unique_article_contributor_count",
    "individual_sme_count",
    "group_sme_count",
];

/// Report file name for `today`, mentioning the window when one is active.
pub fn report_file_name(today: NaiveDate, days: Option<i64>) -> String {
    match days {
        Some(days) => format!("{}_tag_metrics_past_{}_days.csv", format_day(today), days),
        None => format!("{}_tag_metrics.csv", format_day(today)),
    }
}

/// Render rows as CSV text, header included.
pub fn render_csv(rows: &[TagMetrics]) -> String {
    let mut out = String::new();
    push_record(&mut out, HEADER.iter().copied());

    for row in rows {
        let fields = [
            escape(&row.tag_name),
            row.question_count.to_string(),
            row.answer_count.to_string(),
            row.answered_question_count.to_string(),
            row.unanswered_question_count.to_string(),
            row.total_score.to_string(),
            row.total_views.to_string(),
            row.unique_contributor_count.to_string(),
            row.webhook_count.to_string(),
            row.watcher_count.to_string(),
            format_date_opt(row.last_activity_date),
            row.article_count.to_string(),
            row.accepted_answer_count.to_string(),
            row.unique_asker_count.to_string(),
            row.unique_answerer_count.to_string(),
            row.sme_count.to_string(),
            row.sme_answer_count.to_string(),
            row.median_answer_time_hours
                .map(|hours| format!("{:.2}", hours))
                .unwrap_or_default(),
            row.self_answered_question_count.to_string(),
            row.unique_article_contributor_count.to_string(),
            row.individual_sme_count.to_string(),
            row.group_sme_count.to_string(),
        ];
        push_record(&mut out, fields.iter().map(String::as_str));
    }
    out
}

fn push_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(field);
    }
    out.push_str("\r\n");
}

/// Quote a field if it contains a delimiter, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Write the report into `dir` and return its path.
///
/// The directory is created if needed. On failure no partial file is left
/// under the report name.
pub fn write_report(
    dir: &Path,
    rows: &[TagMetrics],
    days: Option<i64>,
    today: NaiveDate,
) -> Result<PathBuf> {
    let path = dir.join(report_file_name(today, days));
    let csv = render_csv(rows);

    persist_atomically(&path, csv.as_bytes()).map_err(|e| Error::Report {
        path: path.clone(),
        message: e.to_string(),
    })?;

    tracing::info!(path = %path.display(), rows = rows.len(), "Report written");
    Ok(path)
}
