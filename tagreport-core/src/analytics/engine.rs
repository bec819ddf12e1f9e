//! Per-tag aggregation
//!
//! Folds a [`Snapshot`] into one [`TagMetrics`] row per known tag.
//!
//! ## Algorithm
//!
//! ```text
//! tags ──► seed one accumulator per tag (every tag gets a row, SME sets)
//!
//! answers ──► fastest answer per question (all answers, not windowed)
//!
//! questions ─┐                       ┌─► question/answered/score/views/askers/answer time
//! answers ───┼─► window filter ──► fold ─► answer/score/answerers/SME answers
//! articles ──┘  (own creation date)  └─► article count/views/authors
//!
//! webhooks, watchers ──► merged by tag name (not windowed)
//!
//! finalize: sets → counts, median answer time, sort by question_count desc, tag_name asc
//! ```
//!
//! The result is rebuilt from scratch on every call and depends only on the
//! snapshot and the window, so repeated calls produce identical output.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::snapshot::{DataPoint, Snapshot};
use crate::types::Question;

use super::window::TimeWindow;

/// Metrics for one tag, in report column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagMetrics {
    pub tag_name: String,
    pub question_count: u64,
    pub answer_count: u64,
    pub answered_question_count: u64,
    pub unanswered_question_count: u64,
    pub total_score: i64,
    pub total_views: i64,
    pub unique_contributor_count: u64,
    pub webhook_count: i64,
    pub watcher_count: i64,
    pub last_activity_date: Option<DateTime<Utc>>,
    pub article_count: u64,
    pub accepted_answer_count: u64,
    pub unique_asker_count: u64,
    pub unique_answerer_count: u64,
    pub sme_count: u64,
    pub sme_answer_count: u64,
    /// Median hours from question to its fastest answer, over in-window
    /// questions answered after they were asked; `None` when there are none
    pub median_answer_time_hours: Option<f64>,
    /// In-window questions whose fastest answer was posted with the question
    pub self_answered_question_count: u64,
    pub unique_article_contributor_count: u64,
    pub individual_sme_count: u64,
    pub group_sme_count: u64,
}

/// Output of one aggregation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    /// One row per tag, ranked
    pub rows: Vec<TagMetrics>,
    /// Posts and supplementary entries examined
    pub records_processed: usize,
    /// Records that could not be attributed (orphan answers, unknown-tag
    /// supplementary entries)
    pub skipped_records: usize,
    /// Non-fatal data-quality messages
    pub notices: Vec<String>,
}

/// Working state for one tag.
#[derive(Default)]
struct Accumulator {
    metrics: TagMetrics,
    contributors: BTreeSet<i64>,
    askers: BTreeSet<i64>,
    answerers: BTreeSet<i64>,
    article_contributors: BTreeSet<i64>,
    smes: BTreeSet<i64>,
    answer_hours: Vec<f64>,
}

impl Accumulator {
    fn touch(&mut self, created: DateTime<Utc>) {
        let last = &mut self.metrics.last_activity_date;
        if last.map_or(true, |current| created > current) {
            *last = Some(created);
        }
    }

    fn finalize(mut self) -> TagMetrics {
        self.metrics.unique_contributor_count = self.contributors.len() as u64;
        self.metrics.unique_asker_count = self.askers.len() as u64;
        self.metrics.unique_answerer_count = self.answerers.len() as u64;
        self.metrics.unique_article_contributor_count = self.article_contributors.len() as u64;
        self.metrics.sme_count = self.smes.len() as u64;
        self.metrics.median_answer_time_hours = median(&mut self.answer_hours);
        self.metrics
    }
}

/// Median rounded to two decimals; `None` for no values.
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    let value = if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    };
    Some((value * 100.0).round() / 100.0)
}

/// Aggregate `snapshot` over `window`.
///
/// Never fails: records that cannot be attributed are counted in
/// [`Aggregation::skipped_records`] and described in
/// [`Aggregation::notices`]. An empty tag list yields no rows.
pub fn aggregate(snapshot: &Snapshot, window: &TimeWindow) -> Aggregation {
    let mut accumulators: HashMap<&str, Accumulator> = HashMap::with_capacity(snapshot.tags.len());
    for tag in &snapshot.tags {
        let entry = accumulators.entry(tag.name.as_str()).or_default();
        entry.metrics.tag_name = tag.name.clone();
        entry.smes = tag.smes.all_users();
        entry.metrics.individual_sme_count =
            tag.smes.users.iter().collect::<BTreeSet<_>>().len() as u64;
        entry.metrics.group_sme_count =
            tag.smes.groups.iter().flatten().collect::<BTreeSet<_>>().len() as u64;
    }

    let mut records_processed = 0;
    let mut skipped_records = 0;
    let mut unknown_tags: BTreeMap<&str, usize> = BTreeMap::new();
    let mut notices = Vec::new();

    // Parents are resolved against the full question list, not the windowed one
    let questions: HashMap<i64, &Question> =
        snapshot.questions.iter().map(|q| (q.id, q)).collect();

    let mut fastest_answer: HashMap<i64, DateTime<Utc>> = HashMap::new();
    for answer in &snapshot.answers {
        fastest_answer
            .entry(answer.question_id)
            .and_modify(|first| *first = (*first).min(answer.creation_date))
            .or_insert(answer.creation_date);
    }

    for question in &snapshot.questions {
        records_processed += 1;
        if !window.includes(question.creation_date) {
            continue;
        }
        for tag in distinct(&question.tags) {
            let Some(acc) = accumulators.get_mut(tag) else {
                *unknown_tags.entry(tag).or_default() += 1;
                continue;
            };
            let m = &mut acc.metrics;
            m.question_count += 1;
            m.total_score += question.score;
            m.total_views += question.view_count;
            if question.is_answered {
                m.answered_question_count += 1;
            } else {
                m.unanswered_question_count += 1;
            }
            if question.accepted_answer_id.is_some() {
                m.accepted_answer_count += 1;
            }
            if let Some(owner) = question.owner_id {
                acc.contributors.insert(owner);
                acc.askers.insert(owner);
            }
            if let Some(first) = fastest_answer.get(&question.id) {
                let seconds = first.signed_duration_since(question.creation_date).num_seconds();
                if seconds > 0 {
                    acc.answer_hours.push(seconds as f64 / 3600.0);
                } else {
                    acc.metrics.self_answered_question_count += 1;
                }
            }
            acc.touch(question.creation_date);
        }
    }

    let mut orphans = 0;
    for answer in &snapshot.answers {
        records_processed += 1;
        // orphans count as skipped whatever the window
        let Some(parent) = questions.get(&answer.question_id) else {
            orphans += 1;
            tracing::debug!(
                answer_id = answer.id,
                question_id = answer.question_id,
                "Answer parent not in snapshot"
            );
            continue;
        };
        if !window.includes(answer.creation_date) {
            continue;
        }
        for tag in distinct(&parent.tags) {
            // unknown parent tags were already noted for the question
            let Some(acc) = accumulators.get_mut(tag) else {
                continue;
            };
            acc.metrics.answer_count += 1;
            acc.metrics.total_score += answer.score;
            if let Some(owner) = answer.owner_id {
                acc.contributors.insert(owner);
                acc.answerers.insert(owner);
                if acc.smes.contains(&owner) {
                    acc.metrics.sme_answer_count += 1;
                }
            }
            acc.touch(answer.creation_date);
        }
    }
    if orphans > 0 {
        skipped_records += orphans;
        notices.push(format!(
            "{} answer(s) skipped because their question is not in the snapshot",
            orphans
        ));
    }

    for article in &snapshot.articles {
        records_processed += 1;
        if !window.includes(article.creation_date) {
            continue;
        }
        for tag in distinct(&article.tags) {
            let Some(acc) = accumulators.get_mut(tag) else {
                *unknown_tags.entry(tag).or_default() += 1;
                continue;
            };
            acc.metrics.article_count += 1;
            acc.metrics.total_views += article.view_count;
            if let Some(owner) = article.owner_id {
                acc.article_contributors.insert(owner);
            }
            acc.touch(article.creation_date);
        }
    }

    for (tag, posts) in &unknown_tags {
        notices.push(format!(
            "tag '{}' on {} post(s) is not in the tag list; ignored for that tag",
            tag, posts
        ));
    }

    let supplementary = &snapshot.supplementary;
    for (name, point) in [
        ("webhooks", &supplementary.webhooks),
        ("watchers", &supplementary.watchers),
    ] {
        let Some(point) = point else { continue };
        if let DataPoint::Skipped { reason } = point {
            notices.push(format!("{} not collected: {}", name, reason));
            continue;
        }
        for entry in point.entries() {
            records_processed += 1;
            let Some(acc) = accumulators.get_mut(entry.tag_name.as_str()) else {
                skipped_records += 1;
                notices.push(format!(
                    "{} entry for unknown tag '{}' dropped",
                    name, entry.tag_name
                ));
                continue;
            };
            match name {
                "webhooks" => acc.metrics.webhook_count += entry.count,
                _ => acc.metrics.watcher_count += entry.count,
            }
        }
    }

    let mut rows: Vec<TagMetrics> = accumulators
        .into_values()
        .map(Accumulator::finalize)
        .collect();
    rows.sort_by(rank);

    tracing::debug!(
        tags = rows.len(),
        records_processed,
        skipped_records,
        window = %window.display_name(),
        "Aggregation complete"
    );

    Aggregation {
        rows,
        records_processed,
        skipped_records,
        notices,
    }
}

/// Most questions first; ties broken by tag name.
fn rank(a: &TagMetrics, b: &TagMetrics) -> Ordering {
    b.question_count
        .cmp(&a.question_count)
        .then_with(|| a.tag_name.cmp(&b.tag_name))
}

/// Tag names of a post, each once, in first-seen order.
fn distinct(tags: &[String]) -> impl Iterator<Item = &str> {
    let mut seen = BTreeSet::new();
    tags.iter()
        .map(String::as_str)
        .filter(move |tag| seen.insert(*tag))
}
