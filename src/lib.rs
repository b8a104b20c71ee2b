//! Hearth - client-resident live state runtime
//!
//! Keeps a single in-memory application store consistent across three
//! concurrent, asynchronous data sources: a one-shot server-rendered snapshot
//! applied at boot, a continuous stream of push events from a live channel,
//! and locally-initiated actions that are authorized against a remaining
//! quota budget and, for paid operations, reconciled with an external payment
//! processor.
//!
//! ## Components
//!
//! - **Store**: the authoritative in-memory state container with explicit
//!   merge rules between hydration, live events, and local writes
//! - **Snapshot hydrator**: applies the one-shot snapshot before anything
//!   live is allowed to happen
//! - **Live channel client**: connection lifecycle (connect, heartbeat,
//!   reconnect, teardown) and frame decoding
//! - **Event router**: per-type store-mutation handlers plus a bounded event
//!   log
//! - **Quota gateway**: optimistic local budget with periodic authoritative
//!   refresh
//! - **Enrollment orchestrator**: per-(user, course) free/paid enrollment
//!   state machine

pub mod channel;
pub mod config;
pub mod enrollment;
pub mod events;
pub mod quota;
pub mod runtime;
pub mod snapshot;
pub mod store;
pub mod types;

pub use channel::{ConnectionState, LiveChannelClient};
pub use config::HearthConfig;
pub use enrollment::{EnrollmentOrchestrator, EnrollmentStatus};
pub use events::{EventKind, LiveEvent};
pub use quota::{ActionKind, Decision, DenyReason, QuotaGateway};
pub use runtime::{Hearth, Session};
pub use snapshot::{Hydrator, Snapshot};
pub use store::Store;
pub use types::{HearthError, Result};
