//! Enrollment and payment orchestration.
//!
//! A per-(user, course) state machine driving free or paid enrollment to
//! completion:
//!
//! `idle -> processing -> (succeeded | awaiting_payment_confirmation ->
//! succeeded | failed) | failed`
//!
//! `succeeded` and `failed` are terminal per attempt. A new attempt may start
//! from `failed`; a succeeded enrollment rejects re-enrollment idempotently by
//! returning the existing terminal state. Concurrent calls for the same pair
//! join the in-flight attempt instead of starting a duplicate.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EnrollmentConfig;
use crate::store::Store;
use crate::types::{HearthError, Result};

/// Attempt lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Idle,
    Processing,
    AwaitingPaymentConfirmation,
    Succeeded,
    Failed,
}

impl EnrollmentStatus {
    /// Whether a collaborator call is outstanding for this state.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Processing | Self::AwaitingPaymentConfirmation)
    }
}

/// Free or paid, known once initiation responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentKind {
    Free,
    Paid,
}

/// One enrollment attempt for a (user, course) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentAttempt {
    pub user_id: String,
    pub course_id: String,
    pub kind: Option<EnrollmentKind>,
    pub status: EnrollmentStatus,
    pub payment_intent_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl EnrollmentAttempt {
    fn processing(user_id: &str, course_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            kind: None,
            status: EnrollmentStatus::Processing,
            payment_intent_ref: None,
            failure_reason: None,
            started_at: Utc::now(),
        }
    }

    fn succeeded(mut self, kind: EnrollmentKind) -> Self {
        self.kind = Some(kind);
        self.status = EnrollmentStatus::Succeeded;
        self
    }

    fn awaiting_payment(mut self, payment_ref: String) -> Self {
        self.kind = Some(EnrollmentKind::Paid);
        self.status = EnrollmentStatus::AwaitingPaymentConfirmation;
        self.payment_intent_ref = Some(payment_ref);
        self
    }

    fn failed(mut self, reason: impl Into<String>) -> Self {
        self.status = EnrollmentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self
    }
}

/// Response from the enrollment initiation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiationResponse {
    pub success: bool,
    #[serde(default)]
    pub is_free: bool,
    pub client_secret: Option<String>,
}

/// Outcome of a payment confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Confirmed,
    Declined { reason: String },
}

/// Enrollment initiation collaborator.
#[async_trait]
pub trait EnrollmentApi: Send + Sync {
    async fn initiate(&self, course_id: &str) -> Result<InitiationResponse>;
}

/// External payment confirmation collaborator.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn confirm(&self, payment_ref: &str) -> Result<PaymentOutcome>;
}

/// Drives enrollment attempts and materializes them into the store.
pub struct EnrollmentOrchestrator {
    api: Arc<dyn EnrollmentApi>,
    payments: Arc<dyn PaymentProcessor>,
    store: Store,
    attempts: DashMap<(String, String), EnrollmentAttempt>,
    request_timeout: Duration,
    running: AtomicBool,
}

impl EnrollmentOrchestrator {
    pub fn new(
        api: Arc<dyn EnrollmentApi>,
        payments: Arc<dyn PaymentProcessor>,
        store: Store,
        config: &EnrollmentConfig,
    ) -> Self {
        Self {
            api,
            payments,
            store,
            attempts: DashMap::new(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            running: AtomicBool::new(true),
        }
    }

    /// Current attempt for a pair, if any.
    pub fn attempt(&self, user_id: &str, course_id: &str) -> Option<EnrollmentAttempt> {
        self.attempts
            .get(&(user_id.to_string(), course_id.to_string()))
            .map(|a| a.clone())
    }

    /// Start an enrollment attempt, or join the one already in flight.
    ///
    /// An attempt in `processing` or `awaiting_payment_confirmation` is
    /// returned as-is rather than duplicated; a `succeeded` attempt is
    /// returned as-is rather than re-run. Only `failed` (or a never-started
    /// pair) starts fresh work.
    pub async fn enroll(&self, user_id: &str, course_id: &str) -> Result<EnrollmentAttempt> {
        let key = (user_id.to_string(), course_id.to_string());

        // The idempotency decision happens under the map entry lock, so two
        // racing calls cannot both start work.
        let attempt = match self.attempts.entry(key.clone()) {
            Entry::Occupied(mut entry) => match entry.get().status {
                EnrollmentStatus::Processing
                | EnrollmentStatus::AwaitingPaymentConfirmation
                | EnrollmentStatus::Succeeded => {
                    debug!(
                        "Enrollment for user {user_id} course {course_id} already {:?}, joining",
                        entry.get().status
                    );
                    return Ok(entry.get().clone());
                }
                EnrollmentStatus::Idle | EnrollmentStatus::Failed => {
                    let fresh = EnrollmentAttempt::processing(user_id, course_id);
                    entry.insert(fresh.clone());
                    fresh
                }
            },
            Entry::Vacant(entry) => {
                let fresh = EnrollmentAttempt::processing(user_id, course_id);
                entry.insert(fresh.clone());
                fresh
            }
        };

        self.store.set_enrollment_attempt(attempt.clone());
        info!("Enrollment started for user {user_id} course {course_id}");

        let response =
            tokio::time::timeout(self.request_timeout, self.api.initiate(course_id)).await;

        if !self.running.load(Ordering::SeqCst) {
            debug!("Discarding enrollment initiation result after teardown");
            return Err(HearthError::ShutDown);
        }

        let next = match response {
            Ok(Ok(r)) if r.success && r.is_free => attempt.succeeded(EnrollmentKind::Free),
            Ok(Ok(r)) if r.success => match r.client_secret {
                Some(secret) => attempt.awaiting_payment(secret),
                // A paid course without a payment reference cannot proceed.
                None => attempt.failed("enrollment initiation returned no payment reference"),
            },
            Ok(Ok(_)) => attempt.failed("enrollment initiation rejected"),
            Ok(Err(e)) => attempt.failed(e.to_string()),
            Err(_) => attempt.failed("enrollment initiation timed out"),
        };

        self.finish(key, next.clone());
        Ok(next)
    }

    /// Confirm payment for an attempt awaiting confirmation.
    ///
    /// Any other state is a no-op returning the current attempt; any
    /// confirmation failure is terminal for this attempt with the processor's
    /// reason stored, and a fresh attempt may then be started.
    pub async fn confirm_payment(&self, user_id: &str, course_id: &str) -> Result<EnrollmentAttempt> {
        let key = (user_id.to_string(), course_id.to_string());

        let (attempt, payment_ref) = match self.attempts.get(&key) {
            None => {
                return Err(HearthError::Internal(format!(
                    "No enrollment attempt for user {user_id} course {course_id}"
                )))
            }
            Some(a) if a.status != EnrollmentStatus::AwaitingPaymentConfirmation => {
                debug!(
                    "Payment confirmation for user {user_id} course {course_id} in {:?}, no-op",
                    a.status
                );
                return Ok(a.clone());
            }
            Some(a) => match &a.payment_intent_ref {
                Some(r) => (a.clone(), r.clone()),
                None => (a.clone(), String::new()),
            },
        };

        if payment_ref.is_empty() {
            let next = attempt.failed("missing payment reference");
            self.finish(key, next.clone());
            return Ok(next);
        }

        let outcome =
            tokio::time::timeout(self.request_timeout, self.payments.confirm(&payment_ref)).await;

        if !self.running.load(Ordering::SeqCst) {
            debug!("Discarding payment confirmation result after teardown");
            return Err(HearthError::ShutDown);
        }

        let next = match outcome {
            Ok(Ok(PaymentOutcome::Confirmed)) => attempt.succeeded(EnrollmentKind::Paid),
            Ok(Ok(PaymentOutcome::Declined { reason })) => attempt.failed(reason),
            Ok(Err(e)) => attempt.failed(e.to_string()),
            Err(_) => attempt.failed("payment confirmation timed out"),
        };

        self.finish(key, next.clone());
        Ok(next)
    }

    fn finish(&self, key: (String, String), attempt: EnrollmentAttempt) {
        match attempt.status {
            EnrollmentStatus::Succeeded => {
                info!(
                    "Enrollment succeeded for user {} course {}",
                    attempt.user_id, attempt.course_id
                );
            }
            EnrollmentStatus::Failed => {
                warn!(
                    "Enrollment failed for user {} course {}: {}",
                    attempt.user_id,
                    attempt.course_id,
                    attempt.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
            _ => {}
        }
        self.attempts.insert(key, attempt.clone());
        self.store.set_enrollment_attempt(attempt);
    }

    /// Discard results of calls still in flight.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
