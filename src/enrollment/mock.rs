//! Mock enrollment and payment collaborators for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::types::{HearthError, Result};

use super::{EnrollmentApi, InitiationResponse, PaymentOutcome, PaymentProcessor};

/// Mock initiation collaborator with a configurable response, optional delay,
/// and call counting.
pub struct MockEnrollmentApi {
    response: Mutex<InitiationResponse>,
    failure: Mutex<Option<String>>,
    delay: Mutex<Duration>,
    call_count: AtomicU32,
}

impl MockEnrollmentApi {
    /// Responds as a free course completed server-side.
    pub fn free() -> Self {
        Self {
            response: Mutex::new(InitiationResponse {
                success: true,
                is_free: true,
                client_secret: None,
            }),
            failure: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            call_count: AtomicU32::new(0),
        }
    }

    /// Responds as a paid course with the given payment reference.
    pub fn paid(client_secret: impl Into<String>) -> Self {
        let api = Self::free();
        *api.response.lock().unwrap_or_else(PoisonError::into_inner) = InitiationResponse {
            success: true,
            is_free: false,
            client_secret: Some(client_secret.into()),
        };
        api
    }

    /// Fail every initiation with a transport error.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
        self
    }

    /// Delay each initiation, to hold attempts in `processing`.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
        self
    }

    /// Replace the response after construction.
    pub fn set_response(&self, response: InitiationResponse) {
        *self.response.lock().unwrap_or_else(PoisonError::into_inner) = response;
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrollmentApi for MockEnrollmentApi {
    async fn initiate(&self, _course_id: &str) -> Result<InitiationResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(HearthError::Transport(message));
        }

        Ok(self
            .response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// Mock payment processor with a configurable outcome and call counting.
pub struct MockPaymentProcessor {
    outcome: Mutex<PaymentOutcome>,
    delay: Mutex<Duration>,
    call_count: AtomicU32,
}

impl MockPaymentProcessor {
    /// Confirms every payment.
    pub fn confirming() -> Self {
        Self {
            outcome: Mutex::new(PaymentOutcome::Confirmed),
            delay: Mutex::new(Duration::ZERO),
            call_count: AtomicU32::new(0),
        }
    }

    /// Declines every payment with the given reason.
    pub fn declining(reason: impl Into<String>) -> Self {
        let processor = Self::confirming();
        *processor
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = PaymentOutcome::Declined {
            reason: reason.into(),
        };
        processor
    }

    /// Delay each confirmation.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
        self
    }

    /// Replace the outcome after construction.
    pub fn set_outcome(&self, outcome: PaymentOutcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = outcome;
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn confirm(&self, _payment_ref: &str) -> Result<PaymentOutcome> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        Ok(self
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
