//! Session State Definitions
//!
//! All mutable state for one live quiz event. Uses BTreeMap for stable
//! iteration order so roster and leaderboard output is reproducible.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::timer;
use crate::quiz::question::{Question, QuizMode};

/// Reserved identifier for the host/admin connection. Excluded from the
/// participant roster and the leaderboard.
pub const HOST_USER_ID: &str = "host";

/// Top-level session lifecycle state. Pausing is a flag on a running
/// countdown, not a distinct status: the current question and locks
/// persist unchanged while paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created, no question active.
    Waiting,
    /// A question is current and the countdown is anchored.
    Running,
    /// Terminal. No transitions leave this state.
    Ended,
}

/// Per-session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Whether to advance automatically after the feedback window.
    pub auto_advance: bool,
    /// Default question time limit in seconds.
    pub default_time_limit: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_advance: true,
            default_time_limit: crate::DEFAULT_TIME_LIMIT_SECS,
        }
    }
}

/// A roster entry. Disconnected participants are retained with
/// `connected = false` so late score queries remain consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Display name.
    pub name: String,
    /// False once the participant's connection drops.
    pub connected: bool,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardItem {
    /// Participant identifier.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Accumulated score.
    pub score: u64,
}

/// Read-only projection of a session for listing surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Connected-or-not roster size.
    pub participants: usize,
    /// Display index of the current question, if any.
    pub current_question: Option<u32>,
    /// Quiz progression mode.
    pub quiz_mode: QuizMode,
}

/// All live state for one quiz session.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Caller-supplied unique identifier.
    pub session_id: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Quiz progression mode.
    pub quiz_mode: QuizMode,
    /// Ordered question list.
    pub questions: Vec<Question>,
    /// Session configuration.
    pub options: SessionOptions,
    /// The question currently presented, if any. Invariant: always a
    /// member of `questions` when set.
    pub current_question: Option<Question>,
    /// Countdown anchor, epoch millis. Set iff a countdown is logically
    /// running. Re-stamped on resume to preserve remaining time.
    pub started_at: Option<i64>,
    /// Nominal countdown duration in seconds for the current question.
    pub time_limit: Option<u64>,
    /// While true, the passage of time must not advance the countdown.
    pub timer_paused: bool,
    /// Wall-clock instant the pause began. Set only while paused.
    pub paused_at: Option<i64>,
    /// While true, submissions are rejected regardless of remaining time.
    pub answers_locked: bool,
    /// Duplicate-submission guard, keyed (user, question). Cleared
    /// exactly once per question transition.
    answered: BTreeSet<(String, String)>,
    /// Last computed leaderboard, score descending.
    pub leaderboard: Vec<LeaderboardItem>,
    /// Roster keyed by participant identifier.
    pub participants: BTreeMap<String, Participant>,
    /// Monotonically increasing on every sanctioned mutation. Consumers
    /// discard versions at or below their last-seen value as stale.
    pub version: u64,
}

impl SessionState {
    /// Create a fresh session in the `waiting` state.
    pub fn new(
        session_id: impl Into<String>,
        options: SessionOptions,
        questions: Vec<Question>,
        quiz_mode: QuizMode,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            status: SessionStatus::Waiting,
            quiz_mode,
            questions,
            options,
            current_question: None,
            started_at: None,
            time_limit: None,
            timer_paused: false,
            paused_at: None,
            answers_locked: false,
            answered: BTreeSet::new(),
            leaderboard: Vec::new(),
            participants: BTreeMap::new(),
            version: 0,
        }
    }

    /// Whether `(user, question)` has already been accepted this question.
    pub fn has_answered(&self, user_id: &str, question_id: &str) -> bool {
        self.answered
            .contains(&(user_id.to_string(), question_id.to_string()))
    }

    /// Record an accepted `(user, question)` pair.
    pub fn mark_answered(&mut self, user_id: &str, question_id: &str) {
        self.answered
            .insert((user_id.to_string(), question_id.to_string()));
    }

    /// Empty the answered-marker set. Called at the moment a new
    /// question becomes current, before any broadcast announcing it.
    pub fn clear_answered(&mut self) {
        self.answered.clear();
    }

    /// Number of accepted answers since the last clear.
    pub fn answered_count(&self) -> usize {
        self.answered.len()
    }

    /// Position of the current question within `questions`, if any.
    pub fn current_question_position(&self) -> Option<usize> {
        let current = self.current_question.as_ref()?;
        self.questions.iter().position(|q| q.id == current.id)
    }

    /// The question after the current one in display order, if any.
    pub fn question_after_current(&self) -> Option<&Question> {
        self.questions.get(self.current_question_position()? + 1)
    }

    /// The question before the current one in display order, if any.
    pub fn question_before_current(&self) -> Option<&Question> {
        let pos = self.current_question_position()?;
        pos.checked_sub(1).and_then(|p| self.questions.get(p))
    }

    /// Look up a question by identifier.
    pub fn find_question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Milliseconds remaining on the current countdown as of `now_ms`.
    /// None when no countdown is anchored.
    pub fn remaining_ms(&self, now_ms: i64) -> Option<i64> {
        let started_at = self.started_at?;
        let limit_ms = self.time_limit? as i64 * 1000;
        Some(timer::remaining_ms(started_at, limit_ms, now_ms))
    }

    /// Read-only projection for session listings.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            status: self.status,
            participants: self.participants.len(),
            current_question: self.current_question.as_ref().map(|q| q.index),
            quiz_mode: self.quiz_mode,
        }
    }
}
