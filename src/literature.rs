//! Literature lookup client
//!
//! Thin client for a Semantic Scholar style paper search API. Every request
//! passes through a shared [`RateLimiter`], so concurrent lookups are
//! admitted one at a time at the configured rate.

use crate::config::LiteratureConfig;
use crate::error::{QuireError, Result};
use crate::ratelimit::RateLimiter;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Fields requested for every paper
pub const PAPER_FIELDS: &str = "title,year,authors,url,abstract";

/// Paper author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Provider author id
    #[serde(default)]
    pub author_id: Option<String>,
    /// Display name
    pub name: String,
}

/// A paper returned by the search API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    /// Provider paper id
    pub paper_id: String,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Publication year
    #[serde(default)]
    pub year: Option<i32>,
    /// Authors in byline order
    #[serde(default)]
    pub authors: Vec<Author>,
    /// Landing page
    #[serde(default)]
    pub url: Option<String>,
    /// Abstract text
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
}

impl Paper {
    /// Comma-separated author names
    pub fn author_names(&self) -> String {
        self.authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Paper>,
}

/// Rate-limited paper search client
#[derive(Debug, Clone)]
pub struct LiteratureClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    limiter: RateLimiter,
}

impl LiteratureClient {
    /// Create a client for `base_url` sharing `limiter`
    pub fn new(
        base_url: Url,
        api_key: Option<String>,
        timeout: Duration,
        limiter: RateLimiter,
    ) -> Result<Self> {
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(QuireError::Http)?;

        Ok(Self {
            client,
            base_url,
            api_key,
            limiter,
        })
    }

    /// Build a client from the `literature` config section
    pub fn from_config(config: &LiteratureConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| QuireError::Config(format!("Invalid literature.base_url: {}", e)))?;
        let limiter = match config.max_queue {
            Some(limit) => RateLimiter::bounded(config.requests_per_second, limit)?,
            None => RateLimiter::new(config.requests_per_second)?,
        };
        Self::new(
            base,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_seconds),
            limiter,
        )
    }

    /// Limiter gating this client's requests
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Search papers matching `query`
    pub async fn search_papers(&self, query: &str, limit: usize) -> Result<Vec<Paper>> {
        let url = self.url("paper/search")?;
        let limit = limit.to_string();
        let request = self.client.get(url).query(&[
            ("query", query),
            ("limit", limit.as_str()),
            ("fields", PAPER_FIELDS),
        ]);

        let response: SearchResponse = self.send("search", request).await?;
        tracing::debug!("Search '{}' returned {} papers", query, response.data.len());
        Ok(response.data)
    }

    /// Fetch one paper by id
    pub async fn get_paper(&self, paper_id: &str) -> Result<Paper> {
        let url = self.url(&format!("paper/{}", paper_id))?;
        let request = self.client.get(url).query(&[("fields", PAPER_FIELDS)]);
        self.send("get_paper", request).await
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| QuireError::Config(format!("Invalid literature path {}: {}", path, e)).into())
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        op: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let request = match &self.api_key {
            Some(key) => request.header("x-api-key", key),
            None => request,
        };

        let response = self
            .limiter
            .with_rate_limit(|| request.send())
            .await?
            .map_err(|e| QuireError::Remote(format!("{} request failed: {}", op, e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(QuireError::Remote(format!("{} was rate limited by the server", op)).into());
        }
        if !status.is_success() {
            return Err(QuireError::Remote(format!("{} returned {}", op, status)).into());
        }

        response
            .json::<T>()
            .await
            .map_err(|e| QuireError::Remote(format!("{} returned bad body: {}", op, e)).into())
    }
}
