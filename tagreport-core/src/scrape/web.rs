//! Authenticated page fetching
//!
//! Reuses a browser session cookie to read admin pages that have no API
//! equivalent. Each data point checks its own permission and edition
//! requirements and is recorded as skipped when they are not met.

use std::time::Duration;

use reqwest::header::COOKIE;
use reqwest::StatusCode;

use crate::api::{CancelToken, Edition};
use crate::error::{Error, Result};
use crate::snapshot::{DataPoint, Snapshot, Supplementary};
use crate::types::Webhook;

use super::html::{self, WebhookTable};

const WEBHOOK_PAGE_SIZE: u32 = 50;
const BUSINESS_INTEGRATIONS: &[&str] = &["slack", "microsoft-teams"];

/// Scraper bound to one instance and one logged-in session.
pub struct WebScraper {
    base_url: String,
    edition: Edition,
    session_cookie: String,
    http_client: reqwest::Client,
    cancel: CancelToken,
}

impl WebScraper {
    /// Create a scraper for `base_url` using a `Cookie` header value copied
    /// from a logged-in browser.
    pub fn new(
        base_url: &str,
        session_cookie: &str,
        timeout_secs: u64,
        cancel: CancelToken,
    ) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let edition = Edition::detect(&base_url)?;

        let session_cookie = session_cookie.trim();
        if session_cookie.is_empty() {
            return Err(Error::Config(
                "scraping requires a session cookie (--session-cookie)".to_string(),
            ));
        }

        // Redirects go to the login page; treat them as failures, not content
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            edition,
            session_cookie: session_cookie.to_string(),
            http_client,
            cancel,
        })
    }

    async fn get_page(&self, path: &str) -> Result<(StatusCode, String)> {
        self.cancel.check()?;
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http_client
            .get(&url)
            .header(COOKIE, &self.session_cookie)
            .send()
            .await
            .map_err(|e| Error::Scrape(format!("failed to load {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, %status, "Page not available");
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::Scrape(format!("failed to read {}: {}", url, e)))?;
        Ok((status, body))
    }

    /// Fail unless the cookie belongs to a logged-in session.
    pub async fn validate_session(&self) -> Result<()> {
        let (status, body) = self.get_page("/users").await?;
        if status == StatusCode::OK && html::has_user_card(&body) {
            tracing::info!("Scraper session is valid");
            Ok(())
        } else {
            Err(Error::Config(format!(
                "session cookie is not logged in to {} (status {})",
                self.base_url, status
            )))
        }
    }

    /// Admin-only pages answer 200 only for admins.
    pub async fn is_admin(&self) -> Result<bool> {
        let path = match self.edition {
            Edition::Enterprise => "/enterprise/admin-settings",
            Edition::Business { .. } => "/admin/settings",
        };
        let (status, _) = self.get_page(path).await?;
        let admin = status == StatusCode::OK;
        if !admin {
            tracing::info!("Session user does not have admin permissions");
        }
        Ok(admin)
    }

    /// Every webhook configured on the instance. Requires admin.
    pub async fn webhooks(&self) -> Result<Vec<Webhook>> {
        let mut webhooks = Vec::new();

        match self.edition {
            Edition::Enterprise => {
                let page_path = |page: u32| {
                    format!(
                        "/enterprise/webhooks?page={}&pagesize={}",
                        page, WEBHOOK_PAGE_SIZE
                    )
                };

                let (status, first) = self.get_page(&page_path(1)).await?;
                check_status(status, &page_path(1))?;
                let pages = html::page_count(&first);
                webhooks.extend(html::parse_webhook_rows(&first, WebhookTable::Enterprise));

                for page in 2..=pages {
                    tracing::info!(page, pages, "Getting webhooks page");
                    let (status, body) = self.get_page(&page_path(page)).await?;
                    check_status(status, &page_path(page))?;
                    webhooks.extend(html::parse_webhook_rows(&body, WebhookTable::Enterprise));
                }
            }
            Edition::Business { .. } => {
                for kind in BUSINESS_INTEGRATIONS.iter().copied() {
                    let path = format!("/admin/integrations/{}", kind);
                    let (status, body) = self.get_page(&path).await?;
                    check_status(status, &path)?;
                    webhooks.extend(html::parse_webhook_rows(
                        &body,
                        WebhookTable::Business { kind },
                    ));
                }
            }
        }

        tracing::info!(count = webhooks.len(), "Found webhooks");
        Ok(webhooks)
    }

    /// Watched tags for each user. Requires Enterprise and admin.
    ///
    /// A user without a tag-notifications page contributes no tags.
    pub async fn watched_tags(
        &self,
        user_ids: &[i64],
        on_progress: &mut (dyn FnMut(&str, usize) + Send),
    ) -> Result<Vec<Vec<String>>> {
        let mut watched = Vec::with_capacity(user_ids.len());
        for (done, user_id) in user_ids.iter().enumerate() {
            let path = format!("/users/tag-notifications/{}", user_id);
            let (status, body) = self.get_page(&path).await?;
            if status == StatusCode::OK {
                watched.push(html::watched_tags(&body));
            } else {
                tracing::debug!(user_id, %status, "No watched tags page");
            }
            on_progress("watched tags", done + 1);
        }
        Ok(watched)
    }

    /// Collect every supplementary data point the session is allowed to see.
    ///
    /// An invalid session is an error; missing permissions or an unsupported
    /// edition only mark the affected data point as skipped.
    pub async fn collect(
        &self,
        snapshot: &Snapshot,
        on_progress: &mut (dyn FnMut(&str, usize) + Send),
    ) -> Result<Supplementary> {
        self.validate_session().await?;
        let admin = self.is_admin().await?;

        let webhooks = if !admin {
            DataPoint::skipped("requires admin permissions")
        } else {
            collected_or_skipped(
                "webhooks",
                self.webhooks()
                    .await
                    .map(|webhooks| html::tally_webhooks(&webhooks)),
            )?
        };

        let watchers = if !self.edition.is_enterprise() {
            DataPoint::skipped("only available on Stack Overflow Enterprise")
        } else if !admin {
            DataPoint::skipped("requires admin permissions")
        } else {
            let user_ids: Vec<i64> = snapshot.users.iter().map(|u| u.user_id).collect();
            collected_or_skipped(
                "watchers",
                self.watched_tags(&user_ids, on_progress)
                    .await
                    .map(|watched| html::tally_watchers(&watched)),
            )?
        };

        let supplementary = Supplementary {
            webhooks: Some(webhooks),
            watchers: Some(watchers),
        };
        for (name, reason) in supplementary.skipped() {
            tracing::warn!(data_point = name, reason, "Supplementary data skipped");
        }
        Ok(supplementary)
    }
}

fn check_status(status: StatusCode, path: &str) -> Result<()> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(Error::Scrape(format!("{} returned {}", path, status)))
    }
}

/// Scrape failures mark the data point skipped; cancellation still aborts.
fn collected_or_skipped(
    name: &str,
    result: Result<Vec<crate::types::TagCount>>,
) -> Result<DataPoint> {
    match result {
        Ok(entries) => Ok(DataPoint::Collected { entries }),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => {
            tracing::warn!(data_point = name, error = %e, "Scraping failed");
            Ok(DataPoint::skipped(format!("scraping failed: {}", e)))
        }
    }
}
