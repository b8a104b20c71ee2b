//! Quota gateway.
//!
//! Gates quota-bound actions against a per-kind daily budget. The budget is a
//! two-phase value: a server-confirmed usage count from the last authoritative
//! refresh, plus the grants handed out locally since then. The two are kept as
//! separate fields so the fail-open window stays auditable: an optimistic
//! grant that turns out to exceed the true budget is never revoked, but the
//! next check fails closed.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::QuotaConfig;
use crate::store::Store;
use crate::types::Result;

/// Kinds of quota-gated actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Chat,
    Hint,
    Quiz,
    Reflection,
    Path,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Hint => "hint",
            Self::Quiz => "quiz",
            Self::Reflection => "reflection",
            Self::Path => "path",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative usage report from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub usage_today: u32,
    pub daily_limit: u32,
    pub remaining_today: u32,
    /// Server-computed window reset; the client never derives this locally
    pub reset_time: Option<DateTime<Utc>>,
}

/// Fetches authoritative quota state.
#[async_trait]
pub trait QuotaSource: Send + Sync {
    async fn fetch(&self, kind: ActionKind) -> Result<UsageReport>;
}

/// Outcome of a reservation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { reason: DenyReason },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Why a reservation was denied. The UI treats these differently: a reached
/// limit gets an upgrade prompt, an unavailable source gets a status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    LimitReached,
    NetworkUnavailable,
}

/// Two-phase budget for one action kind.
#[derive(Debug, Clone)]
pub struct QuotaState {
    /// Server-confirmed usage as of the last refresh
    pub authoritative_used: u32,
    pub limit: u32,
    /// Grants handed out locally since the last refresh
    pub optimistic_grants: u32,
    /// Server-provided window reset
    pub window_resets_at: Option<DateTime<Utc>>,
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl QuotaState {
    /// Budget seeded from config, used until the first refresh.
    pub fn seeded(limit: u32) -> Self {
        Self {
            authoritative_used: 0,
            limit,
            optimistic_grants: 0,
            window_resets_at: None,
            last_refreshed: None,
        }
    }

    /// Locally-known lower bound on usage.
    pub fn known_used(&self) -> u32 {
        self.authoritative_used.saturating_add(self.optimistic_grants)
    }

    pub fn exhausted(&self) -> bool {
        self.known_used() >= self.limit
    }

    fn apply_report(&mut self, report: &UsageReport) {
        self.authoritative_used = report.usage_today;
        self.limit = report.daily_limit;
        self.optimistic_grants = 0;
        self.window_resets_at = report.reset_time;
        self.last_refreshed = Some(Utc::now());
    }
}

/// Quota view materialized into the store for UI consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaView {
    pub used: u32,
    pub limit: u32,
    pub resets_at: Option<DateTime<Utc>>,
}

/// Quota gateway handle.
#[derive(Clone)]
pub struct QuotaGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    source: Arc<dyn QuotaSource>,
    store: Store,
    states: DashMap<ActionKind, QuotaState>,
    config: QuotaConfig,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl QuotaGateway {
    pub fn new(source: Arc<dyn QuotaSource>, store: Store, config: QuotaConfig) -> Self {
        let states = DashMap::new();
        for (kind, limit) in &config.default_limits {
            states.insert(*kind, QuotaState::seeded(*limit));
        }
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(GatewayInner {
                source,
                store,
                states,
                config,
                running: AtomicBool::new(true),
                shutdown_tx,
            }),
        }
    }

    /// Check the budget for `kind` and optimistically reserve one action.
    ///
    /// A locally-known-exhausted budget is denied immediately with no network
    /// round-trip. An unknown budget fails closed until a refresh succeeds.
    /// Otherwise the local count is incremented first and the authoritative
    /// refresh follows in the background, never the other way around.
    pub fn check_and_reserve(&self, kind: ActionKind) -> Decision {
        let decision = match self.inner.states.get_mut(&kind) {
            None => Decision::Denied {
                reason: DenyReason::NetworkUnavailable,
            },
            Some(state) if state.exhausted() => Decision::Denied {
                reason: DenyReason::LimitReached,
            },
            Some(mut state) => {
                state.optimistic_grants += 1;
                Decision::Allowed
            }
        };

        match decision {
            Decision::Allowed => {
                debug!("Reserved one {kind} action");
                self.materialize(kind);
                self.spawn_refresh(kind);
            }
            Decision::Denied {
                reason: DenyReason::NetworkUnavailable,
            } => {
                // No budget knowledge yet; try to learn it for next time.
                self.spawn_refresh(kind);
            }
            Decision::Denied {
                reason: DenyReason::LimitReached,
            } => {
                // Locally-known exhaustion never costs a round-trip.
                info!("Denied {kind} action: limit reached");
            }
        }

        decision
    }

    /// Current budget for a kind.
    pub fn state(&self, kind: ActionKind) -> Option<QuotaState> {
        self.inner.states.get(&kind).map(|s| s.clone())
    }

    fn materialize(&self, kind: ActionKind) {
        if let Some(state) = self.inner.states.get(&kind) {
            self.inner.store.set_quota(
                kind,
                QuotaView {
                    used: state.known_used(),
                    limit: state.limit,
                    resets_at: state.window_resets_at,
                },
            );
        }
    }

    fn spawn_refresh(&self, kind: ActionKind) {
        let gateway = self.clone();
        tokio::spawn(async move {
            let _ = gateway.refresh_now(kind).await;
        });
    }

    /// Fetch the authoritative budget for one kind and apply it.
    ///
    /// A result that arrives after teardown is discarded, not applied.
    pub async fn refresh_now(&self, kind: ActionKind) -> Result<()> {
        let report = self.inner.source.fetch(kind).await;

        if !self.inner.running.load(Ordering::SeqCst) {
            debug!("Discarding quota refresh for {kind} after teardown");
            return Ok(());
        }

        match report {
            Ok(report) => {
                self.inner
                    .states
                    .entry(kind)
                    .or_insert_with(|| QuotaState::seeded(report.daily_limit))
                    .apply_report(&report);
                self.materialize(kind);
                debug!(
                    "Quota refreshed for {kind}: {}/{} used",
                    report.usage_today, report.daily_limit
                );
                Ok(())
            }
            Err(e) => {
                warn!("Quota refresh for {kind} failed: {e}");
                Err(e)
            }
        }
    }

    /// Start the fixed-interval refresh loop.
    pub fn start(&self) {
        let gateway = self.clone();
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        let period = Duration::from_secs(self.inner.config.refresh_interval_secs);

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let kinds: Vec<ActionKind> =
                            gateway.inner.states.iter().map(|e| *e.key()).collect();
                        for kind in kinds {
                            let _ = gateway.refresh_now(kind).await;
                        }
                    }
                    _ = shutdown.changed() => {
                        debug!("Quota refresh loop stopped");
                        return;
                    }
                }
            }
        });
    }

    /// Stop the refresh loop and discard any in-flight refresh results.
    pub fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let _ = self.inner.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_used_combines_phases() {
        let mut state = QuotaState::seeded(10);
        state.authoritative_used = 4;
        state.optimistic_grants = 3;
        assert_eq!(state.known_used(), 7);
        assert!(!state.exhausted());
    }

    #[test]
    fn test_report_resets_optimistic_grants() {
        let mut state = QuotaState::seeded(10);
        state.optimistic_grants = 3;

        state.apply_report(&UsageReport {
            usage_today: 5,
            daily_limit: 10,
            remaining_today: 5,
            reset_time: None,
        });

        assert_eq!(state.authoritative_used, 5);
        assert_eq!(state.optimistic_grants, 0);
        assert_eq!(state.known_used(), 5);
    }

    #[test]
    fn test_action_kind_tags() {
        assert_eq!(ActionKind::Chat.as_str(), "chat");
        assert_eq!(ActionKind::Reflection.to_string(), "reflection");
    }
}
