//! Snapshot store
//!
//! A [`Snapshot`] is the fully materialized set of records one run works
//! from. It is filled once (by the API harvester, optionally extended by the
//! scrape harvester, or loaded from disk) and read-only afterwards.
//!
//! ## On-disk format
//!
//! One JSON object, written atomically:
//!
//! ```json
//! {
//!   "version": 1,
//!   "harvested_at": "2024-05-01T12:00:00Z",
//!   "source_url": "https://stackoverflowteams.com/c/acme",
//!   "tags": [...], "users": [...], "questions": [...],
//!   "answers": [...], "articles": [...],
//!   "supplementary": {
//!     "webhooks": { "status": "collected", "entries": [{"tag_name": "aws", "count": 2}] },
//!     "watchers": { "status": "skipped", "reason": "requires admin permissions" }
//!   }
//! }
//! ```
//!
//! Loading is lenient per record: an element that does not match its record
//! type is skipped and counted instead of failing the whole load.

use crate::error::{Error, Result};
use crate::types::{Answer, Article, Question, Tag, TagCount, User};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Raw records harvested from one Teams instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// When the API harvest finished
    pub harvested_at: Option<DateTime<Utc>>,
    /// Instance URL the records came from
    pub source_url: Option<String>,
    pub tags: Vec<Tag>,
    pub users: Vec<User>,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    pub articles: Vec<Article>,
    #[serde(default)]
    pub supplementary: Supplementary,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            harvested_at: None,
            source_url: None,
            tags: Vec::new(),
            users: Vec::new(),
            questions: Vec::new(),
            answers: Vec::new(),
            articles: Vec::new(),
            supplementary: Supplementary::default(),
        }
    }
}

/// Per-tag data that only the scrape harvester can provide.
///
/// `None` means the data point was not requested for this snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Supplementary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhooks: Option<DataPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watchers: Option<DataPoint>,
}

impl Supplementary {
    /// Reasons for every data point that was requested but skipped.
    pub fn skipped(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        if let Some(DataPoint::Skipped { reason }) = &self.webhooks {
            out.push(("webhooks", reason.as_str()));
        }
        if let Some(DataPoint::Skipped { reason }) = &self.watchers {
            out.push(("watchers", reason.as_str()));
        }
        out
    }
}

/// Outcome of collecting one supplementary data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DataPoint {
    /// Counts per tag name
    Collected { entries: Vec<TagCount> },
    /// Not available for this account or edition
    Skipped { reason: String },
}

impl DataPoint {
    pub fn skipped(reason: impl Into<String>) -> Self {
        DataPoint::Skipped {
            reason: reason.into(),
        }
    }

    /// Collected entries, empty when skipped.
    pub fn entries(&self) -> &[TagCount] {
        match self {
            DataPoint::Collected { entries } => entries,
            DataPoint::Skipped { .. } => &[],
        }
    }
}

/// A snapshot read from disk plus the number of records that were dropped.
#[derive(Debug)]
pub struct LoadedSnapshot {
    pub snapshot: Snapshot,
    /// Records skipped because they were malformed or duplicated
    pub skipped_records: usize,
}

#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    harvested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    tags: Vec<serde_json::Value>,
    #[serde(default)]
    users: Vec<serde_json::Value>,
    #[serde(default)]
    questions: Vec<serde_json::Value>,
    #[serde(default)]
    answers: Vec<serde_json::Value>,
    #[serde(default)]
    articles: Vec<serde_json::Value>,
    #[serde(default)]
    supplementary: serde_json::Value,
}

impl Snapshot {
    /// Total number of harvested records (supplementary counts excluded).
    pub fn record_count(&self) -> usize {
        self.tags.len()
            + self.users.len()
            + self.questions.len()
            + self.answers.len()
            + self.articles.len()
    }

    /// Replace the data points present in `update`, keeping the others.
    pub fn merge_supplementary(&mut self, update: Supplementary) {
        if update.webhooks.is_some() {
            self.supplementary.webhooks = update.webhooks;
        }
        if update.watchers.is_some() {
            self.supplementary.watchers = update.watchers;
        }
    }

    /// Drop tags whose name was already seen, returning how many were dropped.
    pub fn dedup_tags(&mut self) -> usize {
        let before = self.tags.len();
        let mut seen = HashSet::new();
        self.tags.retain(|tag| {
            let fresh = seen.insert(tag.name.clone());
            if !fresh {
                tracing::warn!(tag = %tag.name, "Duplicate tag in snapshot, keeping first");
            }
            fresh
        });
        before - self.tags.len()
    }

    /// Load a snapshot blob.
    ///
    /// A missing file is [`Error::SnapshotNotFound`]; a file that is not a
    /// JSON object is a JSON error; individual bad records are skipped.
    pub fn load(path: &Path) -> Result<LoadedSnapshot> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::SnapshotNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        Self::from_json(&content)
    }

    /// Parse a snapshot from its JSON text.
    pub fn from_json(content: &str) -> Result<LoadedSnapshot> {
        let raw: RawSnapshot = serde_json::from_str(content)?;

        if let Some(version) = raw.version {
            if version > SNAPSHOT_VERSION {
                tracing::warn!(
                    version,
                    supported = SNAPSHOT_VERSION,
                    "Snapshot written by a newer version, reading known fields only"
                );
            }
        }

        let mut skipped = 0;
        let mut snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            harvested_at: raw.harvested_at,
            source_url: raw.source_url,
            tags: parse_records("tags", raw.tags, &mut skipped),
            users: parse_records("users", raw.users, &mut skipped),
            questions: parse_records("questions", raw.questions, &mut skipped),
            answers: parse_records("answers", raw.answers, &mut skipped),
            articles: parse_records("articles", raw.articles, &mut skipped),
            supplementary: parse_supplementary(raw.supplementary, &mut skipped),
        };
        skipped += snapshot.dedup_tags();

        tracing::info!(
            tags = snapshot.tags.len(),
            questions = snapshot.questions.len(),
            answers = snapshot.answers.len(),
            articles = snapshot.articles.len(),
            skipped,
            "Snapshot loaded"
        );

        Ok(LoadedSnapshot {
            snapshot,
            skipped_records: skipped,
        })
    }

    /// Write the snapshot atomically, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        persist_atomically(path, &json)?;
        tracing::info!(
            path = %path.display(),
            records = self.record_count(),
            "Snapshot saved"
        );
        Ok(())
    }
}

fn parse_records<T: DeserializeOwned>(
    collection: &str,
    values: Vec<serde_json::Value>,
    skipped: &mut usize,
) -> Vec<T> {
    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value(value) {
            Ok(record) => records.push(record),
            Err(e) => {
                *skipped += 1;
                tracing::warn!(collection, index, error = %e, "Skipping malformed record");
            }
        }
    }
    records
}

/// Read the supplementary section with the same leniency as the record lists.
///
/// A bad entry inside a collected data point is skipped and counted; a data
/// point that is neither collected nor skipped counts as one skipped record
/// and is treated as not requested.
fn parse_supplementary(value: serde_json::Value, skipped: &mut usize) -> Supplementary {
    let mut fields = match value {
        serde_json::Value::Object(fields) => fields,
        serde_json::Value::Null => return Supplementary::default(),
        other => {
            *skipped += 1;
            tracing::warn!(value = %other, "Ignoring malformed supplementary section");
            return Supplementary::default();
        }
    };

    Supplementary {
        webhooks: parse_data_point("webhooks", fields.remove("webhooks"), skipped),
        watchers: parse_data_point("watchers", fields.remove("watchers"), skipped),
    }
}

fn parse_data_point(
    name: &str,
    value: Option<serde_json::Value>,
    skipped: &mut usize,
) -> Option<DataPoint> {
    let value = value.filter(|v| !v.is_null())?;

    match value.get("status").and_then(serde_json::Value::as_str) {
        Some("collected") => {
            if let Some(serde_json::Value::Array(entries)) = value.get("entries") {
                return Some(DataPoint::Collected {
                    entries: parse_records(name, entries.clone(), skipped),
                });
            }
        }
        Some("skipped") => {
            let reason = value
                .get("reason")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown reason");
            return Some(DataPoint::skipped(reason));
        }
        _ => {}
    }

    *skipped += 1;
    tracing::warn!(data_point = name, value = %value, "Ignoring malformed data point");
    None
}

/// Write `contents` to a temp file next to `path`, then rename it into place.
///
/// Readers see either the previous file or the complete new one.
pub(crate) fn persist_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample_snapshot() -> Snapshot {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Snapshot {
            harvested_at: Some(created),
            source_url: Some("https://stackoverflowteams.com/c/acme".to_string()),
            tags: vec![Tag::new("python", 3), Tag::new("rust", 1)],
            users: vec![User {
                user_id: 2,
                display_name: Some("Ada".to_string()),
            }],
            questions: vec![Question {
                id: 10,
                tags: vec!["python".to_string()],
                creation_date: created,
                score: 4,
                view_count: 50,
                answer_count: 1,
                is_answered: true,
                accepted_answer_id: Some(11),
                owner_id: Some(2),
            }],
            answers: vec![Answer {
                id: 11,
                question_id: 10,
                creation_date: created,
                score: 1,
                is_accepted: true,
                owner_id: Some(3),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_save_then_load_keeps_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/snapshot.json");

        let mut snapshot = sample_snapshot();
        snapshot.supplementary.webhooks = Some(DataPoint::Collected {
            entries: vec![TagCount {
                tag_name: "python".to_string(),
                count: 2,
            }],
        });
        snapshot.save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded.skipped_records, 0);
        assert_eq!(loaded.snapshot.tags, snapshot.tags);
        assert_eq!(loaded.snapshot.questions, snapshot.questions);
        assert_eq!(loaded.snapshot.answers, snapshot.answers);
        assert_eq!(loaded.snapshot.supplementary, snapshot.supplementary);
    }

    #[test]
    fn test_load_missing_file_is_snapshot_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");

        match Snapshot::load(&path) {
            Err(Error::SnapshotNotFound(p)) => assert_eq!(p, path),
            other => panic!("expected SnapshotNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_records_are_skipped_and_counted() {
        let json = r#"{
            "tags": [{"name": "python"}, {"result_count": 4}, {"name": "python"}],
            "questions": [
                {"id": 1, "tags": ["python"], "creation_date": "2024-01-02T00:00:00Z"},
                {"id": 2, "tags": ["python"]}
            ],
            "answers": [{"id": 5}]
        }"#;

        let loaded = Snapshot::from_json(json).unwrap();
        // one tag without a name, one duplicate tag, one question without a date, one answer without a parent
        assert_eq!(loaded.skipped_records, 4);
        assert_eq!(loaded.snapshot.tags.len(), 1);
        assert_eq!(loaded.snapshot.questions.len(), 1);
        assert!(loaded.snapshot.answers.is_empty());
    }

    #[test]
    fn test_malformed_supplementary_entries_are_skipped_and_counted() {
        let json = r#"{
            "tags": [{"name": "python"}],
            "supplementary": {
                "webhooks": {"status": "collected", "entries": [
                    {"tag_name": "python", "count": 2},
                    {"tag_name": "rust"}
                ]},
                "watchers": {"status": "skipped", "reason": "requires admin permissions"}
            }
        }"#;

        let loaded = Snapshot::from_json(json).unwrap();
        assert_eq!(loaded.skipped_records, 1);
        assert_eq!(
            loaded.snapshot.supplementary.webhooks,
            Some(DataPoint::Collected {
                entries: vec![TagCount {
                    tag_name: "python".to_string(),
                    count: 2,
                }],
            })
        );
        assert_eq!(
            loaded.snapshot.supplementary.watchers,
            Some(DataPoint::skipped("requires admin permissions"))
        );
    }

    #[test]
    fn test_unreadable_data_point_is_dropped() {
        let json = r#"{
            "supplementary": {
                "webhooks": {"status": "pending"},
                "watchers": {"status": "collected", "entries": 3}
            }
        }"#;

        let loaded = Snapshot::from_json(json).unwrap();
        assert_eq!(loaded.skipped_records, 2);
        assert_eq!(loaded.snapshot.supplementary, Supplementary::default());

        let loaded = Snapshot::from_json(r#"{"supplementary": "oops"}"#).unwrap();
        assert_eq!(loaded.skipped_records, 1);
    }

    #[test]
    fn test_non_object_blob_is_an_error() {
        assert!(matches!(Snapshot::from_json("42"), Err(Error::Json(_))));
    }

    #[test]
    fn test_merge_supplementary_keeps_unrequested_points() {
        let mut snapshot = sample_snapshot();
        snapshot.supplementary.watchers = Some(DataPoint::skipped("requires admin"));

        snapshot.merge_supplementary(Supplementary {
            webhooks: Some(DataPoint::Collected { entries: vec![] }),
            watchers: None,
        });

        assert_eq!(
            snapshot.supplementary.webhooks,
            Some(DataPoint::Collected { entries: vec![] })
        );
        assert_eq!(
            snapshot.supplementary.skipped(),
            vec![("watchers", "requires admin")]
        );
    }
}
