//! REST adapter for a PostgREST-style session table
//!
//! Requests:
//!
//! - load: `GET /rest/v1/{table}?select=*&fingerprint=eq.{fp}&order=updated_at.desc`
//! - upsert: `POST /rest/v1/{table}` with `Prefer: resolution=merge-duplicates`
//! - delete: `DELETE /rest/v1/{table}?id=eq.{id}`
//! - delete all: `DELETE /rest/v1/{table}?fingerprint=eq.{fp}`
//!
//! When an API key is configured it is sent both as `apikey` and as a
//! bearer token. Transport errors and non-2xx statuses both surface as
//! `QuireError::Remote`.

use super::{RemoteMirror, RemoteSessionRecord};
use crate::config::RemoteConfig;
use crate::error::{QuireError, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use std::time::Duration;
use url::Url;

/// Remote mirror over HTTP
#[derive(Debug, Clone)]
pub struct HttpMirror {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpMirror {
    /// Create an adapter for `table` under `base_url`
    ///
    /// # Errors
    ///
    /// Returns `QuireError::Config` if the endpoint URL cannot be built, or
    /// `QuireError::Http` if the HTTP client cannot be constructed.
    ///
    /// # Examples
    ///
    /// ```
    /// use quire::remote::HttpMirror;
    /// use std::time::Duration;
    ///
    /// let mirror = HttpMirror::new(
    ///     url::Url::parse("https://example.supabase.co").unwrap(),
    ///     "chat_sessions",
    ///     None,
    ///     Duration::from_secs(10),
    /// )
    /// .unwrap();
    /// assert_eq!(
    ///     mirror.endpoint().as_str(),
    ///     "https://example.supabase.co/rest/v1/chat_sessions"
    /// );
    /// ```
    pub fn new(
        base_url: Url,
        table: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut base = base_url;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join(&format!("rest/v1/{}", table))
            .map_err(|e| QuireError::Config(format!("Invalid remote endpoint: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(QuireError::Http)?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    /// Build an adapter from the `remote` config section
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| QuireError::Config(format!("Invalid remote.base_url: {}", e)))?;
        Self::new(
            base,
            &config.table,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    /// Table endpoint all requests go to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request(&self, method: Method) -> RequestBuilder {
        let builder = self.client.request(method, self.endpoint.clone());
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, op: &str, builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| QuireError::Remote(format!("{} request failed: {}", op, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuireError::Remote(format!("{} returned {}: {}", op, status, body)).into());
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteMirror for HttpMirror {
    async fn load_sessions(&self, fingerprint: &str) -> Result<Vec<RemoteSessionRecord>> {
        let builder = self.request(Method::GET).query(&[
            ("select", "*".to_string()),
            ("fingerprint", format!("eq.{}", fingerprint)),
            ("order", "updated_at.desc".to_string()),
        ]);
        let response = self.send("load_sessions", builder).await?;
        let records = response
            .json::<Vec<RemoteSessionRecord>>()
            .await
            .map_err(|e| QuireError::Remote(format!("load_sessions returned bad body: {}", e)))?;
        tracing::debug!("Fetched {} remote sessions", records.len());
        Ok(records)
    }

    async fn upsert_session(&self, record: &RemoteSessionRecord) -> Result<()> {
        let builder = self
            .request(Method::POST)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(record);
        self.send("upsert_session", builder).await?;
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        let builder = self
            .request(Method::DELETE)
            .query(&[("id", format!("eq.{}", id))]);
        self.send("delete_session", builder).await?;
        Ok(())
    }

    async fn delete_all_sessions(&self, fingerprint: &str) -> Result<()> {
        let builder = self
            .request(Method::DELETE)
            .query(&[("fingerprint", format!("eq.{}", fingerprint))]);
        self.send("delete_all_sessions", builder).await?;
        Ok(())
    }
}
