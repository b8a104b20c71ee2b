//! Runtime root.
//!
//! Explicitly constructed application root that owns the store and every
//! component. No ambient globals: the host builds one [`Hearth`] per session,
//! boots it with the snapshot, and tears it down on sign-out.
//!
//! Boot ordering is the load-bearing part: hydration completes before the
//! channel client is permitted to connect, so a stale snapshot can never
//! overwrite state a live event already updated.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use crate::channel::transport::ChannelTransport;
use crate::channel::LiveChannelClient;
use crate::config::HearthConfig;
use crate::enrollment::{EnrollmentApi, EnrollmentOrchestrator, PaymentProcessor};
use crate::events::router::EventRouter;
use crate::quota::{QuotaGateway, QuotaSource};
use crate::snapshot::{Hydrator, Snapshot};
use crate::store::Store;

/// Opaque session facts supplied by the host at boot. The token-bearing
/// cookie is passed through to collaborators, never parsed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub role: String,
    pub cookie: String,
}

/// The application root.
pub struct Hearth {
    store: Store,
    router: Arc<EventRouter>,
    channel: LiveChannelClient,
    quota: QuotaGateway,
    enrollment: Arc<EnrollmentOrchestrator>,
    session: Mutex<Option<Session>>,
    hydrated: AtomicBool,
}

impl Hearth {
    /// Wire up a runtime from its collaborators.
    pub fn new(
        config: HearthConfig,
        transport: Arc<dyn ChannelTransport>,
        quota_source: Arc<dyn QuotaSource>,
        enrollment_api: Arc<dyn EnrollmentApi>,
        payments: Arc<dyn PaymentProcessor>,
    ) -> Self {
        let store = Store::new();
        let router = Arc::new(EventRouter::new(store.clone(), &config.event_log));
        let channel = LiveChannelClient::new(transport, Arc::clone(&router), config.channel.clone());
        let quota = QuotaGateway::new(quota_source, store.clone(), config.quota.clone());
        let enrollment = Arc::new(EnrollmentOrchestrator::new(
            enrollment_api,
            payments,
            store.clone(),
            &config.enrollment,
        ));

        Self {
            store,
            router,
            channel,
            quota,
            enrollment,
            session: Mutex::new(None),
            hydrated: AtomicBool::new(false),
        }
    }

    /// Boot the runtime: hydrate, then connect, then start background
    /// refresh. Hydration always completes before the channel may connect.
    pub async fn boot(&self, session: Option<Session>, snapshot: Option<Snapshot>) {
        *self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = session;

        Hydrator::new(self.store.clone()).hydrate(snapshot);
        self.hydrated.store(true, Ordering::SeqCst);

        self.channel.connect().await;
        self.quota.start();

        info!("Hearth runtime booted");
    }

    /// Tear everything down. In-flight collaborator results arriving after
    /// this are discarded rather than applied.
    pub async fn shutdown(&self) {
        self.channel.shutdown().await;
        self.quota.shutdown();
        self.enrollment.shutdown();
        info!("Hearth runtime shut down");
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn channel(&self) -> &LiveChannelClient {
        &self.channel
    }

    pub fn quota(&self) -> &QuotaGateway {
        &self.quota
    }

    pub fn enrollment(&self) -> &Arc<EnrollmentOrchestrator> {
        &self.enrollment
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::SeqCst)
    }
}
