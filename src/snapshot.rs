//! Snapshot hydration.
//!
//! The server renders one authoritative snapshot per page load. Hydration
//! applies it into the store before the live channel is allowed to connect,
//! so a stale snapshot can never land on top of a newer live event.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::entities::{Course, EnrollmentRecord, PlatformStats, Profile};
use crate::store::Store;

/// One-shot server-rendered snapshot.
///
/// Sections are optional: an unauthenticated request or an upstream fetch
/// failure yields a partial or empty snapshot, never an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub courses: Option<Vec<Course>>,
    #[serde(default)]
    pub enrollments: Option<Vec<EnrollmentRecord>>,
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub stats: Option<PlatformStats>,
}

impl Snapshot {
    /// Whether the snapshot carries no sections at all.
    pub fn is_empty(&self) -> bool {
        self.courses.is_none()
            && self.enrollments.is_none()
            && self.profile.is_none()
            && self.stats.is_none()
    }
}

/// Applies snapshots into the store.
pub struct Hydrator {
    store: Store,
}

impl Hydrator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Apply a snapshot. Idempotent; may run again on host remount.
    ///
    /// Only sections present in the snapshot are overwritten; everything else
    /// keeps its current value. An absent snapshot is a no-op.
    pub fn hydrate(&self, snapshot: Option<Snapshot>) {
        let Some(snapshot) = snapshot else {
            info!("No snapshot present, keeping store defaults");
            return;
        };

        if let Some(courses) = snapshot.courses {
            debug!("Hydrating {} courses", courses.len());
            self.store.replace_courses(courses);
        }
        if let Some(enrollments) = snapshot.enrollments {
            debug!("Hydrating {} enrollments", enrollments.len());
            self.store.replace_enrollments(enrollments);
        }
        if let Some(profile) = snapshot.profile {
            self.store.set_profile(profile);
        }
        if let Some(stats) = snapshot.stats {
            self.store.set_stats(stats);
        }

        info!("Store hydrated from snapshot");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(id: &str, enrolled: i64) -> Course {
        Course {
            id: id.to_string(),
            title: format!("Course {id}"),
            enrolled_count: enrolled,
        }
    }

    #[test]
    fn test_absent_snapshot_is_noop() {
        let store = Store::new();
        let before = store.revision();

        Hydrator::new(store.clone()).hydrate(None);

        assert_eq!(store.revision(), before);
        assert!(store.courses().is_empty());
    }

    #[test]
    fn test_partial_snapshot_leaves_other_fields() {
        let store = Store::new();
        store.set_profile(Profile {
            user_id: "u1".to_string(),
            display_name: "Ada".to_string(),
            role: "learner".to_string(),
        });

        Hydrator::new(store.clone()).hydrate(Some(Snapshot {
            courses: Some(vec![course("c1", 10)]),
            ..Default::default()
        }));

        assert_eq!(store.course("c1").unwrap().enrolled_count, 10);
        // profile was not in the snapshot, so it survives
        assert_eq!(store.profile().unwrap().display_name, "Ada");
    }

    #[test]
    fn test_hydrate_twice_is_idempotent() {
        let store = Store::new();
        let hydrator = Hydrator::new(store.clone());
        let snapshot = Snapshot {
            courses: Some(vec![course("c1", 10)]),
            ..Default::default()
        };

        hydrator.hydrate(Some(snapshot.clone()));
        hydrator.hydrate(Some(snapshot));

        assert_eq!(store.courses().len(), 1);
        assert_eq!(store.course("c1").unwrap().enrolled_count, 10);
    }

    #[test]
    fn test_empty_snapshot_detection() {
        assert!(Snapshot::default().is_empty());
        let snapshot = Snapshot {
            stats: Some(PlatformStats::default()),
            ..Default::default()
        };
        assert!(!snapshot.is_empty());
    }
}
