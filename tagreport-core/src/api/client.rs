//! HTTP client for the Stack Overflow for Teams API
//!
//! Handles edition detection, authentication headers, pagination for both
//! API versions, rate-limit backoff and retry of transient failures.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use crate::config::ApiConfig;
use crate::error::{Error, Result};

use super::CancelToken;

const TEAMS_HOST: &str = "stackoverflowteams.com";
const TEAMS_API_URL: &str = "https://api.stackoverflowteams.com";
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Product edition, derived from the instance URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edition {
    /// Hosted Business/Basic tier, addressed by team slug
    Business { team_slug: String },
    /// Self-hosted Enterprise instance
    Enterprise,
}

impl Edition {
    /// Detect the edition from the instance URL.
    ///
    /// Business URLs look like `https://stackoverflowteams.com/c/TEAM-NAME`;
    /// anything else is treated as Enterprise.
    pub fn detect(base_url: &str) -> Result<Self> {
        if !base_url.contains(TEAMS_HOST) {
            return Ok(Edition::Enterprise);
        }

        let slug = base_url
            .trim_end_matches('/')
            .split("stackoverflowteams.com/c/")
            .nth(1)
            .map(|s| s.split('/').next().unwrap_or_default())
            .unwrap_or_default();

        if slug.is_empty() {
            return Err(Error::Config(format!(
                "cannot find team name in {}; expected https://stackoverflowteams.com/c/TEAM-NAME",
                base_url
            )));
        }

        Ok(Edition::Business {
            team_slug: slug.to_string(),
        })
    }

    pub fn is_enterprise(&self) -> bool {
        matches!(self, Edition::Enterprise)
    }
}

/// Which API surface a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V2,
    V3,
}

/// HTTP client for the Teams API
pub struct ApiClient {
    edition: Edition,
    v2_url: String,
    v3_url: String,
    token: Option<String>,
    key: Option<String>,
    http_client: reqwest::Client,
    page_size: u32,
    max_retries: usize,
    retry_base_delay: Duration,
    cancel: CancelToken,
}

impl ApiClient {
    /// Create a new API client from configuration
    ///
    /// Returns an error if the URL or required credentials are missing.
    /// Business needs a token; Enterprise needs a key (v2.3) and a token (v3).
    pub fn new(config: &ApiConfig, cancel: CancelToken) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::Config("missing instance URL (--url)".to_string()))?
            .trim()
            .trim_end_matches('/')
            .to_string();

        let edition = Edition::detect(&base_url)?;
        let token = non_empty(config.token.as_deref());
        let key = non_empty(config.key.as_deref());

        if token.is_none() {
            return Err(Error::Config("missing API token (--token)".to_string()));
        }
        if edition.is_enterprise() && key.is_none() {
            return Err(Error::Config(
                "missing API key (--key), required for Enterprise".to_string(),
            ));
        }

        let (v2_url, v3_url) = match &edition {
            Edition::Business { team_slug } => (
                format!("{}/2.3", TEAMS_API_URL),
                format!(
                    "{}/v3/teams/{}",
                    TEAMS_API_URL,
                    urlencoding::encode(team_slug)
                ),
            ),
            Edition::Enterprise => (
                format!("{}/api/2.3", base_url),
                format!("{}/api/v3", base_url),
            ),
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            edition,
            v2_url,
            v3_url,
            token,
            key,
            http_client,
            page_size: config.page_size,
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            cancel,
        })
    }

    pub fn edition(&self) -> &Edition {
        &self.edition
    }

    /// Check that the API answers with the configured credentials.
    pub async fn test_connection(&self) -> Result<()> {
        tracing::info!(url = %self.v2_url, "Testing API connection");
        self.get_json(ApiVersion::V2, "/tags", &[("pagesize", "1".to_string())])
            .await?;
        tracing::info!("API connection successful");
        Ok(())
    }

    /// Create a v2.3 response filter including the given attributes.
    ///
    /// See <https://api.stackexchange.com/docs/filters>.
    pub async fn create_filter(&self, include: &[&str]) -> Result<String> {
        let query = vec![
            ("base", "default".to_string()),
            ("unsafe", "false".to_string()),
            ("include", include.join(";")),
        ];
        let response = self
            .get_json(ApiVersion::V2, "/filters/create", &query)
            .await?;

        let filter = response
            .get("items")
            .and_then(|items| items.get(0))
            .and_then(|item| item.get("filter"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Harvest {
                endpoint: self.url(ApiVersion::V2, "/filters/create"),
                message: "response did not contain a filter".to_string(),
            })?;

        tracing::info!(filter, "Filter created");
        Ok(filter.to_string())
    }

    /// Fetch every item of a paginated v2.3 endpoint.
    ///
    /// Follows `has_more` and honours the `backoff` field. `on_page` receives
    /// the number of items fetched so far after each page.
    pub async fn get_v2_items(
        &self,
        endpoint: &str,
        filter: Option<&str>,
        on_page: &mut (dyn FnMut(usize) + Send),
    ) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut query = vec![
                ("page", page.to_string()),
                ("pagesize", self.page_size.to_string()),
            ];
            if let Some(filter) = filter {
                query.push(("filter", filter.to_string()));
            }

            tracing::debug!(endpoint, page, "Getting page");
            let response = self.get_json(ApiVersion::V2, endpoint, &query).await?;

            let page_items = response
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::Harvest {
                    endpoint: self.url(ApiVersion::V2, endpoint),
                    message: "expected an `items` array in the response".to_string(),
                })?;
            items.extend(page_items.iter().cloned());
            on_page(items.len());

            if !response
                .get("has_more")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                break;
            }

            // Ignoring a backoff request leads to throttle_violation errors
            if let Some(backoff) = response.get("backoff").and_then(Value::as_u64) {
                let wait = Duration::from_secs(backoff + 1);
                tracing::info!(endpoint, ?wait, "API backoff requested");
                tokio::time::sleep(wait).await;
            }

            page += 1;
        }

        tracing::info!(endpoint, count = items.len(), "Fetched all pages");
        Ok(items)
    }

    /// Fetch every item of a paginated v3 endpoint (stops at `totalPages`).
    pub async fn get_v3_items(
        &self,
        endpoint: &str,
        on_page: &mut (dyn FnMut(usize) + Send),
    ) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page: u64 = 1;

        loop {
            let query = vec![
                ("page", page.to_string()),
                ("pagesize", self.page_size.to_string()),
            ];
            let response = self.get_json(ApiVersion::V3, endpoint, &query).await?;

            let page_items = response
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::Harvest {
                    endpoint: self.url(ApiVersion::V3, endpoint),
                    message: "expected an `items` array in the response".to_string(),
                })?;
            items.extend(page_items.iter().cloned());
            on_page(items.len());

            let total_pages = response
                .get("totalPages")
                .and_then(Value::as_u64)
                .unwrap_or(page);
            if page >= total_pages {
                break;
            }
            page += 1;
        }

        tracing::info!(endpoint, count = items.len(), "Fetched all pages");
        Ok(items)
    }

    /// Fetch a single (unpaginated) v3 resource.
    pub async fn get_v3(&self, endpoint: &str) -> Result<Value> {
        self.get_json(ApiVersion::V3, endpoint, &[]).await
    }

    /// GET with retry logic
    ///
    /// Retries transient failures (429, 5xx, timeouts, connection errors)
    /// with exponential backoff. Gives up after `max_retries` retries with an
    /// error naming the endpoint and the last failure.
    pub async fn get_json(
        &self,
        version: ApiVersion,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Value> {
        let url = self.url(version, endpoint);
        let mut last_error = String::new();
        let mut delay = self.retry_base_delay;

        for attempt in 0..=self.max_retries {
            self.cancel.check()?;

            if attempt > 0 {
                tracing::debug!(
                    "Retrying {} (attempt {}/{}), waiting {:?}",
                    url,
                    attempt + 1,
                    self.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_RETRY_DELAY);
                self.cancel.check()?;
            }

            match self.send_once(version, &url, query).await {
                Ok(value) => return Ok(value),
                Err(Attempt::Retryable(message)) => {
                    tracing::warn!(url = %url, error = %message, "Transient API error");
                    last_error = message;
                }
                Err(Attempt::Fatal(message)) => {
                    return Err(Error::Harvest {
                        endpoint: url,
                        message,
                    });
                }
            }
        }

        Err(Error::Harvest {
            endpoint: url,
            message: format!(
                "gave up after {} attempts; last error: {}",
                self.max_retries + 1,
                last_error
            ),
        })
    }

    async fn send_once(
        &self,
        version: ApiVersion,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<Value, Attempt> {
        let mut request = self.http_client.get(url).query(query);

        request = match (version, &self.edition) {
            (ApiVersion::V2, Edition::Business { team_slug }) => request
                .query(&[("team", team_slug.as_str())])
                .header("X-API-Access-Token", self.token.as_deref().unwrap_or_default()),
            (ApiVersion::V2, Edition::Enterprise) => {
                request.header("X-API-Key", self.key.as_deref().unwrap_or_default())
            }
            (ApiVersion::V3, _) => request.bearer_auth(self.token.as_deref().unwrap_or_default()),
        };

        let response = request.send().await.map_err(|e| {
            let message = format!("HTTP request failed: {}", e);
            if e.is_timeout() || e.is_connect() || e.is_request() {
                Attempt::Retryable(message)
            } else {
                Attempt::Fatal(message)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| Attempt::Fatal(format!("expected JSON response: {}", e)));
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        let message = format!("API error ({}): {}", status, error_text);

        if is_retryable_status(status) {
            Err(Attempt::Retryable(message))
        } else {
            Err(Attempt::Fatal(message))
        }
    }

    fn url(&self, version: ApiVersion, endpoint: &str) -> String {
        match version {
            ApiVersion::V2 => format!("{}{}", self.v2_url, endpoint),
            ApiVersion::V3 => format!("{}{}", self.v3_url, endpoint),
        }
    }
}

/// Outcome of a single failed request attempt
enum Attempt {
    Retryable(String),
    Fatal(String),
}

/// Rate limiting and server-side failures are worth retrying
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
