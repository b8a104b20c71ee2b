//! Mock quota source for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::types::{HearthError, Result};

use super::{ActionKind, QuotaSource, UsageReport};

/// Mock source with configurable per-kind reports and call counting.
pub struct MockQuotaSource {
    reports: Mutex<HashMap<ActionKind, UsageReport>>,
    available: AtomicBool,
    fetch_count: AtomicU32,
}

impl MockQuotaSource {
    pub fn new() -> Self {
        Self {
            reports: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            fetch_count: AtomicU32::new(0),
        }
    }

    /// Set the report returned for a kind.
    pub fn with_report(self, kind: ActionKind, report: UsageReport) -> Self {
        self.set_report(kind, report);
        self
    }

    /// Set availability; an unavailable source fails every fetch.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Replace the report for a kind after construction.
    pub fn set_report(&self, kind: ActionKind, report: UsageReport) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, report);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// How many fetches were attempted.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

impl Default for MockQuotaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuotaSource for MockQuotaSource {
    async fn fetch(&self, kind: ActionKind) -> Result<UsageReport> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(HearthError::Transport("mock quota source offline".to_string()));
        }

        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .ok_or_else(|| {
                HearthError::Collaborator(format!("no usage report configured for {kind}"))
            })
    }
}
