//! Integration tests for the snapshot → aggregation → report pipeline
//!
//! These tests use `tests/fixtures/snapshot.json`, a small harvested snapshot
//! with one malformed question, one orphan answer and a webhook count for a
//! tag the instance does not know.

use chrono::{NaiveDate, TimeZone, Utc};
use std::path::PathBuf;
use tagreport_core::analytics::{aggregate, TimeWindow};
use tagreport_core::{report, DataPoint, Snapshot};
use tempfile::TempDir;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/snapshot.json")
}

fn report_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
}

// ============================================
// Snapshot loading
// ============================================

#[test]
fn test_fixture_loads_with_malformed_question_skipped() {
    let loaded = Snapshot::load(&fixture_path()).expect("fixture should load");

    assert_eq!(loaded.skipped_records, 1);
    let snapshot = &loaded.snapshot;
    assert_eq!(snapshot.tags.len(), 3);
    assert_eq!(snapshot.users.len(), 3);
    assert_eq!(snapshot.questions.len(), 2);
    assert_eq!(snapshot.answers.len(), 2);
    assert_eq!(snapshot.articles.len(), 1);
    assert!(matches!(
        snapshot.supplementary.watchers,
        Some(DataPoint::Skipped { .. })
    ));
}

#[test]
fn test_fixture_survives_save_and_reload() {
    let loaded = Snapshot::load(&fixture_path()).unwrap();
    let dir = TempDir::new().unwrap();
    let copy = dir.path().join("snapshot.json");

    loaded.snapshot.save(&copy).unwrap();
    let reloaded = Snapshot::load(&copy).unwrap();

    assert_eq!(reloaded.skipped_records, 0);
    assert_eq!(
        aggregate(&reloaded.snapshot, &TimeWindow::all_time()),
        aggregate(&loaded.snapshot, &TimeWindow::all_time())
    );
}

// ============================================
// Aggregation
// ============================================

#[test]
fn test_all_time_aggregation_of_fixture() {
    let loaded = Snapshot::load(&fixture_path()).unwrap();
    let aggregation = aggregate(&loaded.snapshot, &TimeWindow::all_time());

    let names: Vec<_> = aggregation.rows.iter().map(|r| r.tag_name.as_str()).collect();
    assert_eq!(names, vec!["python", "rust", "go"]);

    let python = &aggregation.rows[0];
    assert_eq!(python.question_count, 2);
    assert_eq!(python.answer_count, 1);
    assert_eq!(python.answered_question_count, 1);
    assert_eq!(python.unanswered_question_count, 1);
    assert_eq!(python.total_score, 8);
    assert_eq!(python.total_views, 120);
    assert_eq!(python.unique_contributor_count, 2);
    assert_eq!(python.webhook_count, 2);
    assert_eq!(python.watcher_count, 0);
    assert_eq!(python.sme_count, 2);
    assert_eq!(python.sme_answer_count, 1);
    assert_eq!(python.median_answer_time_hours, Some(49.0));
    assert_eq!(
        python.last_activity_date,
        Some(Utc.with_ymd_and_hms(2024, 2, 1, 15, 30, 0).unwrap())
    );

    let go = &aggregation.rows[2];
    assert_eq!(go.question_count, 0);
    assert_eq!(go.article_count, 1);
    assert_eq!(go.total_views, 45);

    // 2 questions, 2 answers, 1 article, 2 webhook entries
    assert_eq!(aggregation.records_processed, 7);
    // orphan answer and the webhook entry for an unknown tag
    assert_eq!(aggregation.skipped_records, 2);
    assert!(aggregation.notices.iter().any(|n| n.contains("cobol")));
    assert!(aggregation
        .notices
        .iter()
        .any(|n| n.contains("watchers not collected")));
}

#[test]
fn test_windowed_aggregation_of_fixture() {
    let loaded = Snapshot::load(&fixture_path()).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 2, 15, 0, 0, 0).unwrap();
    let window = TimeWindow::past_days(30, now).unwrap();

    let aggregation = aggregate(&loaded.snapshot, &window);
    let python = aggregation
        .rows
        .iter()
        .find(|r| r.tag_name == "python")
        .unwrap();

    // only question 101 falls inside; webhooks are point-in-time and still count
    assert_eq!(python.question_count, 1);
    assert_eq!(python.answer_count, 0);
    assert_eq!(python.unanswered_question_count, 1);
    assert_eq!(python.webhook_count, 2);

    // orphan answer (outside the window) and the unknown webhook tag
    assert_eq!(aggregation.skipped_records, 2);
}

// ============================================
// Report
// ============================================

#[test]
fn test_report_for_fixture() {
    let loaded = Snapshot::load(&fixture_path()).unwrap();
    let aggregation = aggregate(&loaded.snapshot, &TimeWindow::all_time());
    let dir = TempDir::new().unwrap();

    let path = report::write_report(dir.path(), &aggregation.rows, None, report_day()).unwrap();
    assert_eq!(path.file_name().unwrap(), "2024-03-02_tag_metrics.csv");

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], report::HEADER.join(","));
    assert_eq!(
        lines[1],
        "python,2,1,1,1,8,120,2,2,0,2024-02-01,0,1,1,1,2,1,49.00,0,0,1,2"
    );
    assert_eq!(
        lines[2],
        "rust,1,0,0,1,1,20,1,0,0,2024-02-01,0,0,1,0,0,0,,0,0,0,0"
    );
    assert_eq!(
        lines[3],
        "go,0,0,0,0,0,45,0,0,0,2024-02-20,1,0,0,0,0,0,,0,1,0,0"
    );
}

#[test]
fn test_windowed_report_name_mentions_days() {
    let loaded = Snapshot::load(&fixture_path()).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
    let window = TimeWindow::past_days(7, now).unwrap();
    let aggregation = aggregate(&loaded.snapshot, &window);
    let dir = TempDir::new().unwrap();

    let path =
        report::write_report(dir.path(), &aggregation.rows, window.days(), report_day()).unwrap();
    assert_eq!(
        path.file_name().unwrap(),
        "2024-03-02_tag_metrics_past_7_days.csv"
    );

    // every tag still gets a row, with zero posts in the window
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 4);
}
