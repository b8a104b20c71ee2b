//! Store reconciler.
//!
//! The single authoritative in-memory state container. Only five writers
//! mutate it: the snapshot hydrator, the event router's handlers, the quota
//! gateway, and the enrollment orchestrator; everything else reads. Mutation
//! is whole-field replacement or one of the merge functions below, so readers
//! never observe a partial update.
//!
//! Merge rules:
//! - Entity collections keyed by id are upserted by id.
//! - Counters apply signed deltas; a decrement for an untracked key is a
//!   no-op, which keeps out-of-order increment/decrement pairs from double
//!   counting.
//! - The unread-notification counter only grows until an explicit mark-read.

pub mod entities;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tracing::debug;

use crate::enrollment::EnrollmentAttempt;
use crate::quota::{ActionKind, QuotaView};
use entities::{Course, EnrollmentRecord, PlatformStats, Profile, StudentProgress};

#[derive(Debug, Default)]
struct StoreState {
    courses: HashMap<String, Course>,
    enrollments: HashMap<String, EnrollmentRecord>,
    profile: Option<Profile>,
    stats: PlatformStats,
    progress: HashMap<String, StudentProgress>,
    /// Student id -> live session count
    active_students: HashMap<String, i64>,
    /// Lesson id -> confusion signals raised
    confusion: HashMap<String, u32>,
    unread_notifications: u64,
    latest_broadcast: Option<String>,
    /// Payment reference -> last reported status
    payments: HashMap<String, String>,
    quotas: HashMap<ActionKind, QuotaView>,
    /// (user id, course id) -> materialized enrollment attempt
    enrollment_attempts: HashMap<(String, String), EnrollmentAttempt>,
}

/// Cloneable handle to the shared store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: RwLock<StoreState>,
    revision: watch::Sender<u64>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(StoreState::default()),
                revision,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.inner.revision.send_modify(|r| *r += 1);
    }

    /// Current mutation revision.
    pub fn revision(&self) -> u64 {
        *self.inner.revision.subscribe().borrow()
    }

    /// Watch for store mutations without polling.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    // ---- hydration (whole-collection replacement) ----

    pub fn replace_courses(&self, courses: Vec<Course>) {
        let mut state = self.write();
        state.courses = courses.into_iter().map(|c| (c.id.clone(), c)).collect();
        drop(state);
        self.bump();
    }

    pub fn replace_enrollments(&self, enrollments: Vec<EnrollmentRecord>) {
        let mut state = self.write();
        state.enrollments = enrollments.into_iter().map(|e| (e.id.clone(), e)).collect();
        drop(state);
        self.bump();
    }

    pub fn set_profile(&self, profile: Profile) {
        self.write().profile = Some(profile);
        self.bump();
    }

    pub fn set_stats(&self, stats: PlatformStats) {
        self.write().stats = stats;
        self.bump();
    }

    // ---- live-event merges ----

    /// Upsert a course by id.
    pub fn upsert_course(&self, course: Course) {
        self.write().courses.insert(course.id.clone(), course);
        self.bump();
    }

    /// Upsert a server-side enrollment record by id.
    pub fn upsert_enrollment(&self, record: EnrollmentRecord) {
        self.write().enrollments.insert(record.id.clone(), record);
        self.bump();
    }

    /// Upsert per-student progress, last write wins.
    pub fn upsert_progress(&self, progress: StudentProgress) {
        self.write()
            .progress
            .insert(progress.student_id.clone(), progress);
        self.bump();
    }

    /// Apply a signed delta to a course's enrolled count.
    ///
    /// Unknown course ids are a no-op: the event may describe a course this
    /// session never hydrated.
    pub fn apply_course_enrollment_delta(&self, course_id: &str, delta: i64) {
        let mut state = self.write();
        let tracked = match state.courses.get_mut(course_id) {
            Some(course) => {
                course.enrolled_count += delta;
                true
            }
            None => false,
        };
        drop(state);

        if tracked {
            self.bump();
        } else {
            debug!("Enrollment delta for untracked course {course_id}, ignoring");
        }
    }

    /// Apply a signed delta to a student's live session count.
    ///
    /// A decrement for an untracked student is a no-op; entries are removed
    /// when their count reaches zero.
    pub fn apply_student_delta(&self, student_id: &str, delta: i64) {
        let mut state = self.write();
        if delta >= 0 {
            *state.active_students.entry(student_id.to_string()).or_insert(0) += delta;
        } else {
            let drained = match state.active_students.get_mut(student_id) {
                Some(count) => {
                    *count += delta;
                    *count <= 0
                }
                None => {
                    debug!("Decrement for untracked student {student_id}, ignoring");
                    return;
                }
            };
            if drained {
                state.active_students.remove(student_id);
            }
        }
        drop(state);
        self.bump();
    }

    /// Record a confusion signal against a lesson.
    pub fn record_confusion(&self, lesson_id: &str) {
        *self.write().confusion.entry(lesson_id.to_string()).or_insert(0) += 1;
        self.bump();
    }

    /// Count one unread notification. Returns the new unread count.
    pub fn notification_received(&self) -> u64 {
        let count = {
            let mut state = self.write();
            state.unread_notifications += 1;
            state.unread_notifications
        };
        self.bump();
        count
    }

    /// Explicit user action: reset the unread-notification counter.
    pub fn mark_notifications_read(&self) {
        self.write().unread_notifications = 0;
        self.bump();
    }

    pub fn set_broadcast(&self, message: impl Into<String>) {
        self.write().latest_broadcast = Some(message.into());
        self.bump();
    }

    pub fn set_payment_status(&self, reference: impl Into<String>, status: impl Into<String>) {
        self.write().payments.insert(reference.into(), status.into());
        self.bump();
    }

    // ---- materialized state machine views ----

    pub fn set_quota(&self, kind: ActionKind, view: QuotaView) {
        self.write().quotas.insert(kind, view);
        self.bump();
    }

    pub fn set_enrollment_attempt(&self, attempt: EnrollmentAttempt) {
        let key = (attempt.user_id.clone(), attempt.course_id.clone());
        self.write().enrollment_attempts.insert(key, attempt);
        self.bump();
    }

    // ---- readers ----

    pub fn course(&self, id: &str) -> Option<Course> {
        self.read().courses.get(id).cloned()
    }

    pub fn courses(&self) -> Vec<Course> {
        self.read().courses.values().cloned().collect()
    }

    pub fn enrollment(&self, id: &str) -> Option<EnrollmentRecord> {
        self.read().enrollments.get(id).cloned()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.read().profile.clone()
    }

    pub fn stats(&self) -> PlatformStats {
        self.read().stats.clone()
    }

    pub fn progress_for(&self, student_id: &str) -> Option<StudentProgress> {
        self.read().progress.get(student_id).cloned()
    }

    pub fn active_student_count(&self) -> usize {
        self.read().active_students.len()
    }

    pub fn active_sessions(&self, student_id: &str) -> i64 {
        self.read().active_students.get(student_id).copied().unwrap_or(0)
    }

    pub fn confusion_count(&self, lesson_id: &str) -> u32 {
        self.read().confusion.get(lesson_id).copied().unwrap_or(0)
    }

    pub fn unread_notifications(&self) -> u64 {
        self.read().unread_notifications
    }

    pub fn latest_broadcast(&self) -> Option<String> {
        self.read().latest_broadcast.clone()
    }

    pub fn payment_status(&self, reference: &str) -> Option<String> {
        self.read().payments.get(reference).cloned()
    }

    pub fn quota(&self, kind: ActionKind) -> Option<QuotaView> {
        self.read().quotas.get(&kind).cloned()
    }

    pub fn enrollment_attempt(&self, user_id: &str, course_id: &str) -> Option<EnrollmentAttempt> {
        self.read()
            .enrollment_attempts
            .get(&(user_id.to_string(), course_id.to_string()))
            .cloned()
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
    fn test_progress_last_write_wins() {
        let store = Store::new();

        for percent in [10.0, 55.0, 42.0] {
            store.upsert_progress(StudentProgress {
                student_id: "s1".to_string(),
                course_id: None,
                percent_complete: percent,
                updated_at: None,
            });
        }

        assert_eq!(store.progress_for("s1").unwrap().percent_complete, 42.0);
    }

    #[test]
    fn test_student_decrement_untracked_is_noop() {
        let store = Store::new();
        store.apply_student_delta("s1", 1);

        store.apply_student_delta("ghost", -1);

        assert_eq!(store.active_student_count(), 1);
        assert_eq!(store.active_sessions("ghost"), 0);
    }

    #[test]
    fn test_student_delta_removes_at_zero() {
        let store = Store::new();
        store.apply_student_delta("s1", 2);
        store.apply_student_delta("s1", -1);
        assert_eq!(store.active_sessions("s1"), 1);

        store.apply_student_delta("s1", -1);
        assert_eq!(store.active_student_count(), 0);
    }

    #[test]
    fn test_course_delta_on_untracked_course_is_noop() {
        let store = Store::new();
        store.apply_course_enrollment_delta("missing", 1);
        assert!(store.course("missing").is_none());
    }

    #[test]
    fn test_notifications_monotonic_until_mark_read() {
        let store = Store::new();
        assert_eq!(store.notification_received(), 1);
        assert_eq!(store.notification_received(), 2);

        store.mark_notifications_read();
        assert_eq!(store.unread_notifications(), 0);
        assert_eq!(store.notification_received(), 1);
    }

    #[test]
    fn test_revision_bumps_on_mutation() {
        let store = Store::new();
        let before = store.revision();
        store.upsert_course(course("c1", 0));
        assert!(store.revision() > before);
    }

    #[test]
    fn test_replace_courses_overwrites_wholesale() {
        let store = Store::new();
        store.replace_courses(vec![course("c1", 5), course("c2", 3)]);
        store.replace_courses(vec![course("c3", 1)]);

        assert!(store.course("c1").is_none());
        assert_eq!(store.courses().len(), 1);
    }
}
