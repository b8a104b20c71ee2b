//! Entity records held by the store.
//!
//! These mirror the server's shapes: snapshot sections hydrate them wholesale,
//! live events upsert them by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A course as presented to the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    /// Maintained by signed deltas from enrollment-changed events
    #[serde(default)]
    pub enrolled_count: i64,
}

/// A server-side enrollment record (distinct from a local enrollment attempt).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub status: String,
}

/// The signed-in user's profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    pub role: String,
}

/// Aggregate platform statistics from the snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformStats {
    pub total_courses: u64,
    pub total_learners: u64,
}

/// Per-student progress, last-write-wins by student id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProgress {
    pub student_id: String,
    pub course_id: Option<String>,
    pub percent_complete: f64,
    pub updated_at: Option<DateTime<Utc>>,
}
