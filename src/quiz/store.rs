//! Session Store
//!
//! The authoritative mutable state container plus the process-wide score
//! ledger and rate limiter. No knowledge of the transport: every
//! operation on an unknown session is a silent no-op, tolerating races
//! between disconnects and in-flight events.

use std::collections::BTreeMap;

use tracing::debug;

use crate::quiz::question::{Question, QuizMode};
use crate::quiz::state::{LeaderboardItem, Participant, SessionState, SessionSummary};
use crate::quiz::SessionOptions;

/// Owns all live sessions, the score ledger, and per-user rate limits.
///
/// The score and rate-limit maps are keyed by user id alone, not per
/// session. A participant identifier reused across concurrent sessions
/// therefore shares one score accumulator; see DESIGN.md.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: BTreeMap<String, SessionState>,
    scores: BTreeMap<String, u64>,
    rate_limits: BTreeMap<String, Vec<i64>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session in the `waiting` state. An existing session with
    /// the same identifier is silently replaced.
    pub fn create_session(
        &mut self,
        session_id: &str,
        options: SessionOptions,
        questions: Vec<Question>,
        quiz_mode: QuizMode,
    ) -> &mut SessionState {
        if self.sessions.contains_key(session_id) {
            debug!(session_id, "replacing existing session");
        }
        let session = SessionState::new(session_id, options, questions, quiz_mode);
        self.sessions.insert(session_id.to_string(), session);
        self.sessions
            .get_mut(session_id)
            .expect("session just inserted")
    }

    /// Look up a session.
    pub fn get(&self, session_id: &str) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    /// Look up a session mutably, bypassing the version counter.
    /// Orchestration-level changes go through [`SessionStore::update`].
    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut SessionState> {
        self.sessions.get_mut(session_id)
    }

    /// Apply a mutation and bump the version counter. The sanctioned
    /// path for question transitions, pause/resume, locks, and status
    /// changes. Returns the new version, or None if the session is
    /// unknown.
    pub fn update<F>(&mut self, session_id: &str, mutate: F) -> Option<u64>
    where
        F: FnOnce(&mut SessionState),
    {
        let session = self.sessions.get_mut(session_id)?;
        mutate(session);
        session.version += 1;
        Some(session.version)
    }

    /// Remove a session entirely. Returns whether it existed.
    pub fn delete_session(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Upsert a roster entry as connected.
    pub fn add_participant(&mut self, session_id: &str, user_id: &str, name: &str) {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        session.participants.insert(
            user_id.to_string(),
            Participant {
                name: name.to_string(),
                connected: true,
            },
        );
    }

    /// Mark a participant disconnected. The entry is retained so score
    /// lookups for the identifier remain consistent.
    pub fn remove_participant(&mut self, session_id: &str, user_id: &str) {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return;
        };
        if let Some(participant) = session.participants.get_mut(user_id) {
            participant.connected = false;
        }
    }

    /// Duplicate-submission guard, keyed (user, question) per session.
    pub fn has_answered(&self, session_id: &str, user_id: &str, question_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .map(|s| s.has_answered(user_id, question_id))
            .unwrap_or(false)
    }

    /// Record an accepted answer for the duplicate guard.
    pub fn mark_answered(&mut self, session_id: &str, user_id: &str, question_id: &str) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.mark_answered(user_id, question_id);
        }
    }

    /// Empty the answered-marker set for the current question.
    pub fn clear_current_question_answers(&mut self, session_id: &str) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.clear_answered();
        }
    }

    /// Current score for a user, zero if never scored.
    pub fn user_score(&self, user_id: &str) -> u64 {
        self.scores.get(user_id).copied().unwrap_or(0)
    }

    /// Apply a score delta, clamping the result at zero. Returns the
    /// new score.
    pub fn update_score(&mut self, user_id: &str, delta: i64) -> u64 {
        let current = self.user_score(user_id) as i64;
        let new_score = (current + delta).max(0) as u64;
        self.scores.insert(user_id.to_string(), new_score);
        new_score
    }

    /// Rebuild and store the session leaderboard: connected participants
    /// only, score descending. Ties keep roster iteration order; exact
    /// tie ordering is not a user-facing guarantee.
    pub fn update_leaderboard(&mut self, session_id: &str) -> Vec<LeaderboardItem> {
        let Some(session) = self.sessions.get(session_id) else {
            return Vec::new();
        };

        let mut leaderboard: Vec<LeaderboardItem> = session
            .participants
            .iter()
            .filter(|(_, p)| p.connected)
            .map(|(user_id, p)| LeaderboardItem {
                user_id: user_id.clone(),
                name: p.name.clone(),
                score: self.user_score(user_id),
            })
            .collect();

        leaderboard.sort_by(|a, b| b.score.cmp(&a.score));

        let session = self
            .sessions
            .get_mut(session_id)
            .expect("session checked above");
        session.leaderboard = leaderboard.clone();
        leaderboard
    }

    /// Sliding-window rate limiter, global per user. Retains only
    /// timestamps within the trailing window; rejects when the count is
    /// at the cap, otherwise records `now_ms` and accepts.
    pub fn check_rate_limit(
        &mut self,
        user_id: &str,
        max_requests: usize,
        window_ms: i64,
        now_ms: i64,
    ) -> bool {
        let timestamps = self.rate_limits.entry(user_id.to_string()).or_default();
        timestamps.retain(|&t| now_ms - t < window_ms);

        if timestamps.len() >= max_requests {
            return false;
        }
        timestamps.push(now_ms);
        true
    }

    /// Read-only projections of all sessions, for listing surfaces.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions.values().map(|s| s.summary()).collect()
    }

    /// Number of live sessions (ended sessions are retained until
    /// explicitly deleted).
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::question::default_questions;
    use crate::quiz::state::SessionStatus;

    fn store_with_session(id: &str) -> SessionStore {
        let mut store = SessionStore::new();
        store.create_session(
            id,
            SessionOptions::default(),
            default_questions(),
            QuizMode::Live,
        );
        store
    }

    #[test]
    fn test_create_and_get() {
        let store = store_with_session("s1");
        let session = store.get("s1").unwrap();
        assert_eq!(session.status, SessionStatus::Waiting);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_create_replaces_existing() {
        let mut store = store_with_session("s1");
        store.update("s1", |s| s.status = SessionStatus::Running);
        assert_eq!(store.get("s1").unwrap().version, 1);

        store.create_session(
            "s1",
            SessionOptions::default(),
            default_questions(),
            QuizMode::Static,
        );
        let replaced = store.get("s1").unwrap();
        assert_eq!(replaced.version, 0);
        assert_eq!(replaced.quiz_mode, QuizMode::Static);
    }

    #[test]
    fn test_update_bumps_version() {
        let mut store = store_with_session("s1");
        let v1 = store.update("s1", |s| s.answers_locked = true).unwrap();
        let v2 = store.update("s1", |s| s.answers_locked = false).unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
        assert!(store.update("missing", |_| ()).is_none());
    }

    #[test]
    fn test_score_clamps_at_zero() {
        let mut store = SessionStore::new();
        assert_eq!(store.user_score("alice"), 0);
        assert_eq!(store.update_score("alice", 1), 1);
        assert_eq!(store.update_score("alice", -5), 0);
        assert_eq!(store.update_score("alice", 3), 3);
    }

    #[test]
    fn test_answered_markers_scoped_per_session() {
        let mut store = store_with_session("s1");
        store.create_session(
            "s2",
            SessionOptions::default(),
            default_questions(),
            QuizMode::Live,
        );

        store.mark_answered("s1", "alice", "q1");
        assert!(store.has_answered("s1", "alice", "q1"));
        assert!(!store.has_answered("s2", "alice", "q1"));

        store.clear_current_question_answers("s1");
        assert!(!store.has_answered("s1", "alice", "q1"));
    }

    #[test]
    fn test_unknown_session_noops() {
        let mut store = SessionStore::new();
        store.add_participant("missing", "alice", "Alice");
        store.remove_participant("missing", "alice");
        store.mark_answered("missing", "alice", "q1");
        store.clear_current_question_answers("missing");
        assert!(!store.has_answered("missing", "alice", "q1"));
        assert!(store.update_leaderboard("missing").is_empty());
        assert!(!store.delete_session("missing"));
    }

    #[test]
    fn test_leaderboard_sorted_descending() {
        let mut store = store_with_session("s1");
        store.add_participant("s1", "alice", "Alice");
        store.add_participant("s1", "bob", "Bob");
        store.update_score("alice", 1);
        store.update_score("bob", 3);

        let leaderboard = store.update_leaderboard("s1");
        assert_eq!(leaderboard.len(), 2);
        assert_eq!(leaderboard[0].user_id, "bob");
        assert_eq!(leaderboard[0].score, 3);
        assert_eq!(leaderboard[1].user_id, "alice");
    }

    #[test]
    fn test_leaderboard_excludes_disconnected() {
        let mut store = store_with_session("s1");
        store.add_participant("s1", "alice", "Alice");
        store.add_participant("s1", "bob", "Bob");
        store.update_score("bob", 2);

        store.remove_participant("s1", "bob");
        let leaderboard = store.update_leaderboard("s1");
        assert_eq!(leaderboard.len(), 1);
        assert_eq!(leaderboard[0].user_id, "alice");

        // Score record persists for the disconnected participant.
        assert_eq!(store.user_score("bob"), 2);
        // Roster entry retained, flagged disconnected.
        let session = store.get("s1").unwrap();
        assert!(!session.participants["bob"].connected);
    }

    #[test]
    fn test_rate_limit_window() {
        let mut store = SessionStore::new();
        let t0 = 1_000_000;

        assert!(store.check_rate_limit("alice", 3, 1000, t0));
        assert!(store.check_rate_limit("alice", 3, 1000, t0 + 100));
        assert!(store.check_rate_limit("alice", 3, 1000, t0 + 200));
        // Fourth within the window is rejected.
        assert!(!store.check_rate_limit("alice", 3, 1000, t0 + 300));
        // Unaffected user is admitted.
        assert!(store.check_rate_limit("bob", 3, 1000, t0 + 300));
        // After the window slides past the first entries, admitted again.
        assert!(store.check_rate_limit("alice", 3, 1000, t0 + 1500));
    }

    #[test]
    fn test_summaries() {
        let mut store = store_with_session("s1");
        store.add_participant("s1", "alice", "Alice");
        let summaries = store.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].session_id, "s1");
        assert_eq!(summaries[0].participants, 1);
    }
}
