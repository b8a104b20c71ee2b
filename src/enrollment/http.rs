//! HTTP enrollment and payment collaborators.
//!
//! Thin clients for the platform's enrollment API and the payment processor's
//! confirmation endpoint. Failures become typed results; nothing here panics
//! into the orchestrator.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::types::{HearthError, Result};

use super::{EnrollmentApi, InitiationResponse, PaymentOutcome, PaymentProcessor};

/// Default timeout for collaborator calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Enrollment initiation over the platform HTTP API.
pub struct HttpEnrollmentApi {
    client: reqwest::Client,
    base_url: String,
    cookie: Option<String>,
}

impl HttpEnrollmentApi {
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
impl EnrollmentApi for HttpEnrollmentApi {
    async fn initiate(&self, course_id: &str) -> Result<InitiationResponse> {
        let url = format!("{}/api/courses/{course_id}/enroll", self.base_url);

        let mut request = self.client.post(&url);
        if let Some(cookie) = &self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| HearthError::Transport(format!("Enrollment initiation failed: {e}")))?;

        if !response.status().is_success() {
            return Err(HearthError::Collaborator(format!(
                "Enrollment endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<InitiationResponse>()
            .await
            .map_err(|e| HearthError::Protocol(format!("Invalid initiation response: {e}")))
    }
}

/// Payment confirmation over the processor's HTTP API.
pub struct HttpPaymentProcessor {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmResponse {
    success: bool,
    reason: Option<String>,
}

impl HttpPaymentProcessor {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    async fn confirm(&self, payment_ref: &str) -> Result<PaymentOutcome> {
        let url = format!("{}/api/payments/confirm", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "reference": payment_ref }))
            .send()
            .await
            .map_err(|e| HearthError::Transport(format!("Payment confirmation failed: {e}")))?;

        let body = response
            .json::<ConfirmResponse>()
            .await
            .map_err(|e| HearthError::Protocol(format!("Invalid confirmation response: {e}")))?;

        if body.success {
            Ok(PaymentOutcome::Confirmed)
        } else {
            Ok(PaymentOutcome::Declined {
                reason: body
                    .reason
                    .unwrap_or_else(|| "payment was not completed".to_string()),
            })
        }
    }
}
