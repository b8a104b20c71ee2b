//! HTTP quota source.
//!
//! Fetches authoritative usage from the platform API. The session cookie is
//! passed through opaque; the endpoint scopes the report to the signed-in
//! user.

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{HearthError, Result};

use super::{ActionKind, QuotaSource, UsageReport};

/// Default timeout for quota fetches
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Quota source backed by the platform's HTTP API.
pub struct HttpQuotaSource {
    client: reqwest::Client,
    base_url: String,
    cookie: Option<String>,
}

impl HttpQuotaSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into(),
            cookie: None,
        }
    }

    /// Attach the opaque session cookie.
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }
}

#[async_trait]
impl QuotaSource for HttpQuotaSource {
    async fn fetch(&self, kind: ActionKind) -> Result<UsageReport> {
        let url = format!("{}/api/quota/{}", self.base_url, kind.as_str());

        let mut request = self.client.get(&url);
        if let Some(cookie) = &self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| HearthError::Transport(format!("Quota fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(HearthError::Collaborator(format!(
                "Quota endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<UsageReport>()
            .await
            .map_err(|e| HearthError::Protocol(format!("Invalid usage report: {e}")))
    }
}
