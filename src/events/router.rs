//! Event router.
//!
//! Dispatches each decoded event to the matching store-mutation handler.
//! Routing is synchronous and side-effects only through the store; no I/O
//! happens here. Every event is appended to the bounded log *before* handler
//! dispatch, so the log reflects arrival order even when a handler fails, and
//! a failing handler never blocks the events behind it.

use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::config::EventLogConfig;
use crate::store::entities::{EnrollmentRecord, StudentProgress};
use crate::store::Store;
use crate::types::{HearthError, Result};

use super::log::{EventLog, EventLogEntry};
use super::{EventKind, LiveEvent};

/// Bounded set of recently processed event ids.
///
/// Events are processed at most once by id, so frames replayed across a
/// reconnect gap do not double-apply.
#[derive(Debug)]
struct SeenIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an id; returns false when it was already present.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }
}

/// Routes decoded events into store mutations.
pub struct EventRouter {
    store: Store,
    log: Mutex<EventLog>,
    seen: Mutex<SeenIds>,
}

#[derive(Debug, Deserialize)]
struct ProgressPayload {
    student_id: String,
    course_id: Option<String>,
    percent_complete: f64,
}

#[derive(Debug, Deserialize)]
struct EnrollmentChangedPayload {
    id: String,
    user_id: Option<String>,
    course_id: String,
    status: Option<String>,
    #[serde(default)]
    delta: i64,
}

#[derive(Debug, Deserialize)]
struct ActivityPayload {
    student_id: String,
    #[serde(default)]
    delta: i64,
}

#[derive(Debug, Deserialize)]
struct ConfusionPayload {
    #[allow(dead_code)]
    student_id: String,
    lesson_id: String,
}

#[derive(Debug, Deserialize)]
struct PaymentPayload {
    reference: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct BroadcastPayload {
    message: String,
}

impl EventRouter {
    pub fn new(store: Store, config: &EventLogConfig) -> Self {
        Self {
            store,
            log: Mutex::new(EventLog::new(config.capacity)),
            seen: Mutex::new(SeenIds::new(config.dedup_capacity)),
        }
    }

    /// Route one event: dedup by id, append to the log, then dispatch.
    pub fn route(&self, event: LiveEvent) {
        {
            let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            if !seen.insert(&event.id) {
                debug!("Duplicate event {} ({}), skipping", event.id, event.kind);
                return;
            }
        }

        // Log before dispatch so arrival order survives handler failures.
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(event.clone());

        match self.dispatch(&event) {
            Ok(true) => {
                self.log
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .mark_last_consumed();
                debug!("Routed {} event {}", event.kind, event.id);
            }
            Ok(false) => {
                debug!("Unknown event type {}, logged and ignored", event.kind);
            }
            Err(e) => {
                warn!("Handler for {} event {} failed: {e}", event.kind, event.id);
            }
        }
    }

    /// Dispatch to the handler for the event's type.
    ///
    /// Returns `Ok(false)` for unknown types. Handler failures are contained
    /// by the caller and never propagate past `route`.
    fn dispatch(&self, event: &LiveEvent) -> Result<bool> {
        match &event.kind {
            EventKind::ProgressUpdated => self.on_progress_updated(event)?,
            EventKind::EnrollmentChanged => self.on_enrollment_changed(event)?,
            EventKind::AnalyticsUpdated => self.on_analytics_updated(event)?,
            EventKind::ConfusionRaised => self.on_confusion_raised(event)?,
            EventKind::Notification => {
                let unread = self.store.notification_received();
                debug!("Notification received, {unread} unread");
            }
            EventKind::PaymentUpdated => self.on_payment_updated(event)?,
            EventKind::Broadcast => self.on_broadcast(event)?,
            EventKind::Connected => {
                debug!("Channel handshake acknowledged by server");
            }
            EventKind::Unknown(_) => return Ok(false),
        }
        Ok(true)
    }

    fn parse<T: serde::de::DeserializeOwned>(&self, event: &LiveEvent) -> Result<T> {
        serde_json::from_value(event.payload.clone()).map_err(|e| {
            HearthError::Protocol(format!("Invalid {} payload: {e}", event.kind))
        })
    }

    fn on_progress_updated(&self, event: &LiveEvent) -> Result<()> {
        let payload: ProgressPayload = self.parse(event)?;
        self.store.upsert_progress(StudentProgress {
            student_id: payload.student_id,
            course_id: payload.course_id,
            percent_complete: payload.percent_complete,
            updated_at: event.server_timestamp,
        });
        Ok(())
    }

    fn on_enrollment_changed(&self, event: &LiveEvent) -> Result<()> {
        let payload: EnrollmentChangedPayload = self.parse(event)?;
        self.store.upsert_enrollment(EnrollmentRecord {
            id: payload.id,
            user_id: payload.user_id.unwrap_or_default(),
            course_id: payload.course_id.clone(),
            status: payload.status.unwrap_or_else(|| "enrolled".to_string()),
        });
        if payload.delta != 0 {
            self.store
                .apply_course_enrollment_delta(&payload.course_id, payload.delta);
        }
        Ok(())
    }

    fn on_analytics_updated(&self, event: &LiveEvent) -> Result<()> {
        let payload: ActivityPayload = self.parse(event)?;
        self.store.apply_student_delta(&payload.student_id, payload.delta);
        Ok(())
    }

    fn on_confusion_raised(&self, event: &LiveEvent) -> Result<()> {
        let payload: ConfusionPayload = self.parse(event)?;
        self.store.record_confusion(&payload.lesson_id);
        Ok(())
    }

    fn on_payment_updated(&self, event: &LiveEvent) -> Result<()> {
        let payload: PaymentPayload = self.parse(event)?;
        self.store.set_payment_status(payload.reference, payload.status);
        Ok(())
    }

    fn on_broadcast(&self, event: &LiveEvent) -> Result<()> {
        let payload: BroadcastPayload = self.parse(event)?;
        self.store.set_broadcast(payload.message);
        Ok(())
    }

    /// Snapshot of the event log in arrival order.
    pub fn recent_events(&self) -> Vec<EventLogEntry> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> (EventRouter, Store) {
        let store = Store::new();
        (EventRouter::new(store.clone(), &EventLogConfig::default()), store)
    }

    fn progress_event(id: &str, student: &str, percent: f64) -> LiveEvent {
        LiveEvent::new(
            EventKind::ProgressUpdated,
            serde_json::json!({ "student_id": student, "percent_complete": percent }),
        )
        .with_id(id)
    }

    #[test]
    fn test_progress_event_upserts_store() {
        let (router, store) = router();
        router.route(progress_event("e1", "s1", 25.0));

        assert_eq!(store.progress_for("s1").unwrap().percent_complete, 25.0);
    }

    #[test]
    fn test_duplicate_event_applied_once() {
        let (router, store) = router();
        router.route(progress_event("e1", "s1", 25.0));
        router.route(progress_event("e1", "s1", 99.0));

        assert_eq!(store.progress_for("s1").unwrap().percent_complete, 25.0);
        assert_eq!(router.recent_events().len(), 1);
    }

    #[test]
    fn test_unknown_event_logged_not_consumed() {
        let (router, _store) = router();
        router.route(LiveEvent::new(
            EventKind::Unknown("telemetry-v2".to_string()),
            serde_json::json!({}),
        ));

        let log = router.recent_events();
        assert_eq!(log.len(), 1);
        assert!(!log[0].consumed);
    }

    #[test]
    fn test_missing_id_payload_dropped_without_mutation() {
        let (router, store) = router();
        // enrollment-changed without the required record id
        router.route(LiveEvent::new(
            EventKind::EnrollmentChanged,
            serde_json::json!({ "course_id": "c1", "delta": 1 }),
        ));

        assert!(store.enrollment("e1").is_none());
        // arrival is still logged
        assert_eq!(router.recent_events().len(), 1);
        assert!(!router.recent_events()[0].consumed);
    }

    #[test]
    fn test_handler_failure_does_not_block_next_event() {
        let (router, store) = router();
        router.route(
            LiveEvent::new(EventKind::ProgressUpdated, serde_json::json!({ "bad": true }))
                .with_id("broken"),
        );
        router.route(progress_event("ok", "s1", 50.0));

        assert_eq!(store.progress_for("s1").unwrap().percent_complete, 50.0);
        assert_eq!(router.recent_events().len(), 2);
    }

    #[test]
    fn test_seen_ids_evict_oldest() {
        let mut seen = SeenIds::new(2);
        assert!(seen.insert("a"));
        assert!(seen.insert("b"));
        assert!(seen.insert("c"));
        // "a" was evicted and may be seen again
        assert!(seen.insert("a"));
        assert!(!seen.insert("c"));
    }
}
