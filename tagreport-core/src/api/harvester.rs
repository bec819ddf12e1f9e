//! Harvest orchestration
//!
//! Drives the [`ApiClient`] over every resource the report needs and
//! assembles the results into a [`Snapshot`]. Per-tag SME lookups run on a
//! bounded worker pool; everything else is sequential.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::scrape::SupplementarySource;
use crate::snapshot::Snapshot;
use crate::types::TagSmes;

use super::client::{ApiClient, Edition};
use super::records;
use super::CancelToken;

// Prebuilt v2.3 filters for the hosted edition, which cannot create filters.
const BUSINESS_QUESTION_FILTER: &str = "!X9DEEiFwy0OeSWoJzb.QMqab2wPSk.X2opZDa2L";
const BUSINESS_ARTICLE_FILTER: &str = "!*Mg4Pjg9LXr9d_(v";
const BUSINESS_USER_FILTER: &str = "!6WPIommaBqvsI";

/// Attributes the Enterprise question filter must add so answers come embedded.
const QUESTION_FILTER_INCLUDE: &[&str] = &[
    "question.answers",
    "question.accepted_answer_id",
    "answer.is_accepted",
];

/// Counts from one harvest run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub questions: usize,
    pub answers: usize,
    pub articles: usize,
    pub users: usize,
    pub tags: usize,
    /// Tags whose SME assignment was fetched
    pub sme_lookups: usize,
    /// API items dropped because they lacked required fields
    pub skipped_records: usize,
}

/// A freshly harvested snapshot and the stats describing it.
#[derive(Debug)]
pub struct HarvestOutcome {
    pub snapshot: Snapshot,
    pub stats: HarvestStats,
}

/// Pulls every resource from the platform API.
pub struct ApiHarvester {
    client: Arc<ApiClient>,
    source_url: String,
    max_concurrent_requests: usize,
    cancel: CancelToken,
}

impl ApiHarvester {
    pub fn new(config: &ApiConfig, cancel: CancelToken) -> Result<Self> {
        let client = ApiClient::new(config, cancel.clone())?;
        Ok(Self {
            client: Arc::new(client),
            source_url: config
                .base_url
                .clone()
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            max_concurrent_requests: config.max_concurrent_requests,
            cancel,
        })
    }

    pub fn edition(&self) -> &Edition {
        self.client.edition()
    }

    /// Harvest questions (with answers), articles, users, tags and SMEs.
    ///
    /// `on_progress` is called with the resource name and the number of items
    /// fetched so far for it.
    pub async fn harvest(
        &self,
        on_progress: &mut (dyn FnMut(&str, usize) + Send),
    ) -> Result<HarvestOutcome> {
        self.client.test_connection().await?;

        let (question_filter, article_filter, user_filter) = match self.client.edition() {
            Edition::Business { .. } => (
                Some(BUSINESS_QUESTION_FILTER.to_string()),
                Some(BUSINESS_ARTICLE_FILTER.to_string()),
                Some(BUSINESS_USER_FILTER.to_string()),
            ),
            Edition::Enterprise => (
                Some(self.client.create_filter(QUESTION_FILTER_INCLUDE).await?),
                None,
                None,
            ),
        };

        let mut stats = HarvestStats::default();

        tracing::info!("Getting questions and answers");
        let items = self
            .client
            .get_v2_items("/questions", question_filter.as_deref(), &mut |n| {
                on_progress("questions", n)
            })
            .await?;
        let qa = records::parse_questions(&items);
        stats.skipped_records += qa.skipped;
        self.cancel.check()?;

        tracing::info!("Getting articles");
        let items = self
            .client
            .get_v2_items("/articles", article_filter.as_deref(), &mut |n| {
                on_progress("articles", n)
            })
            .await?;
        let articles = records::parse_articles(&items);
        stats.skipped_records += articles.skipped;
        self.cancel.check()?;

        tracing::info!("Getting users");
        let items = self
            .client
            .get_v2_items("/users", user_filter.as_deref(), &mut |n| {
                on_progress("users", n)
            })
            .await?;
        let users = records::parse_users(&items);
        stats.skipped_records += users.skipped;
        self.cancel.check()?;

        tracing::info!("Getting tags");
        let items = self
            .client
            .get_v3_items("/tags", &mut |n| on_progress("tags", n))
            .await?;
        let mut tags = records::parse_tags(&items);
        stats.skipped_records += tags.skipped;
        self.cancel.check()?;

        let smes = self.fetch_smes(&tags.records, on_progress).await?;
        stats.sme_lookups = smes.len();
        for tag in &mut tags.records {
            if let Some(assignment) = tag.id.and_then(|id| smes.get(&id)) {
                tag.smes = assignment.clone();
            }
        }

        let mut snapshot = Snapshot {
            harvested_at: Some(Utc::now()),
            source_url: Some(self.source_url.clone()),
            tags: tags.records,
            users: users.records,
            questions: qa.questions,
            answers: qa.answers,
            articles: articles.records,
            ..Default::default()
        };
        stats.skipped_records += snapshot.dedup_tags();

        stats.questions = snapshot.questions.len();
        stats.answers = snapshot.answers.len();
        stats.articles = snapshot.articles.len();
        stats.users = snapshot.users.len();
        stats.tags = snapshot.tags.len();

        tracing::info!(?stats, "API harvest complete");
        Ok(HarvestOutcome { snapshot, stats })
    }

    /// Fetch SME assignments for every tag with an id.
    ///
    /// Workers are bounded by a semaphore and report over a channel; this
    /// function is the only writer of the result map.
    async fn fetch_smes(
        &self,
        tags: &[crate::types::Tag],
        on_progress: &mut (dyn FnMut(&str, usize) + Send),
    ) -> Result<HashMap<i64, TagSmes>> {
        let tag_ids: Vec<i64> = tags.iter().filter_map(|t| t.id).collect();
        tracing::info!(
            count = tag_ids.len(),
            concurrency = self.max_concurrent_requests,
            "Getting subject matter experts"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_requests));
        let (tx, mut rx) = mpsc::channel::<(i64, Result<TagSmes>)>(self.max_concurrent_requests);
        let mut workers = JoinSet::new();

        for tag_id in tag_ids {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            workers.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => client
                        .get_v3(&format!("/tags/{}/subject-matter-experts", tag_id))
                        .await
                        .map(|value| records::parse_smes(&value)),
                    Err(_) => Err(Error::Cancelled),
                };
                // receiver gone means the harvest already failed
                let _ = tx.send((tag_id, result)).await;
            });
        }
        drop(tx);

        let mut smes = HashMap::new();
        while let Some((tag_id, result)) = rx.recv().await {
            match result {
                Ok(assignment) => {
                    smes.insert(tag_id, assignment);
                    on_progress("subject matter experts", smes.len());
                }
                Err(e) => {
                    workers.abort_all();
                    return Err(e);
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| Error::Harvest {
                endpoint: "/tags/{id}/subject-matter-experts".to_string(),
                message: format!("worker failed: {}", e),
            })?;
        }

        Ok(smes)
    }
}

/// Synchronous wrapper for use from the CLI.
///
/// Owns a current-thread runtime and blocks on the async harvest, then lets
/// the supplementary source enrich the snapshot before it is persisted.
pub struct SyncHarvester {
    inner: ApiHarvester,
    supplementary: SupplementarySource,
    cancel: CancelToken,
    runtime: tokio::runtime::Runtime,
}

impl SyncHarvester {
    pub fn new(
        config: &ApiConfig,
        supplementary: SupplementarySource,
        cancel: CancelToken,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("failed to create runtime: {}", e)))?;

        Ok(Self {
            inner: ApiHarvester::new(config, cancel.clone())?,
            supplementary,
            cancel,
            runtime,
        })
    }

    pub fn edition(&self) -> &Edition {
        self.inner.edition()
    }

    /// Harvest, enrich and atomically save the snapshot to `snapshot_path`.
    ///
    /// Nothing is written when the run fails or is cancelled.
    pub fn run(
        &self,
        snapshot_path: &Path,
        on_progress: &mut (dyn FnMut(&str, usize) + Send),
    ) -> Result<HarvestOutcome> {
        let mut outcome = self.runtime.block_on(async {
            let mut outcome = self.inner.harvest(on_progress).await?;
            let supplementary = self
                .supplementary
                .collect(&outcome.snapshot, on_progress)
                .await?;
            outcome.snapshot.merge_supplementary(supplementary);
            Ok::<_, Error>(outcome)
        })?;

        self.cancel.check()?;
        outcome.snapshot.version = crate::snapshot::SNAPSHOT_VERSION;
        outcome.snapshot.save(snapshot_path)?;
        Ok(outcome)
    }
}
