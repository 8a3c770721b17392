//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON for debugging ease,
//! with optional binary (bincode) for flat records.

use serde::{Deserialize, Serialize};

use crate::quiz::question::{Question, QuizMode};
use crate::quiz::state::{LeaderboardItem, SessionStatus};
use crate::quiz::SessionOptions;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server. Admin frames carry an optional
/// capability token, checked at the server boundary before admission
/// into the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a session room as a participant (or as the reserved host).
    JoinRoom {
        /// Session identifier.
        session_id: String,
        /// Caller-supplied participant identifier.
        user_id: String,
        /// Display name.
        name: String,
    },

    /// Submit an answer to the current question.
    SubmitAnswer {
        /// Session identifier.
        session_id: String,
        /// Participant identifier.
        user_id: String,
        /// Question being answered.
        question_id: String,
        /// Chosen option text.
        choice: String,
        /// Client send timestamp, epoch millis. Informational only.
        client_sent_at: i64,
    },

    /// Create and start a session.
    StartSession {
        /// Session identifier.
        session_id: String,
        /// Partial configuration overrides.
        #[serde(default)]
        options: Option<SessionOptionsPatch>,
        /// Question list; the server-side bank is used when absent.
        #[serde(default)]
        questions: Option<Vec<Question>>,
        /// Quiz mode, defaulting to live.
        #[serde(default)]
        quiz_mode: Option<QuizMode>,
        /// Admin capability token.
        #[serde(default)]
        admin_token: Option<String>,
    },

    /// Set the current question by id or inline payload.
    SetQuestion {
        /// Session identifier.
        session_id: String,
        /// Identifier of a question already in the session list.
        #[serde(default)]
        question_id: Option<String>,
        /// Inline question payload, takes precedence over `question_id`.
        #[serde(default)]
        question: Option<Question>,
        /// Admin capability token.
        #[serde(default)]
        admin_token: Option<String>,
    },

    /// Advance to the next question in display order.
    NextQuestion {
        /// Session identifier.
        session_id: String,
        /// Admin capability token.
        #[serde(default)]
        admin_token: Option<String>,
    },

    /// Go back to the previous question in display order.
    PrevQuestion {
        /// Session identifier.
        session_id: String,
        /// Admin capability token.
        #[serde(default)]
        admin_token: Option<String>,
    },

    /// Pause the countdown.
    PauseTimer {
        /// Session identifier.
        session_id: String,
        /// Admin capability token.
        #[serde(default)]
        admin_token: Option<String>,
    },

    /// Resume a paused countdown.
    ResumeTimer {
        /// Session identifier.
        session_id: String,
        /// Admin capability token.
        #[serde(default)]
        admin_token: Option<String>,
    },

    /// Lock answer submissions.
    LockAnswers {
        /// Session identifier.
        session_id: String,
        /// Admin capability token.
        #[serde(default)]
        admin_token: Option<String>,
    },

    /// Unlock answer submissions.
    UnlockAnswers {
        /// Session identifier.
        session_id: String,
        /// Admin capability token.
        #[serde(default)]
        admin_token: Option<String>,
    },

    /// Signal clients to reveal the correct option. Does not mutate state.
    RevealAnswer {
        /// Session identifier.
        session_id: String,
        /// Admin capability token.
        #[serde(default)]
        admin_token: Option<String>,
    },

    /// End the session. Terminal.
    EndSession {
        /// Session identifier.
        session_id: String,
        /// Admin capability token.
        #[serde(default)]
        admin_token: Option<String>,
    },
}

impl ClientMessage {
    /// Whether this frame is a privileged admin command.
    pub fn is_admin(&self) -> bool {
        !matches!(
            self,
            ClientMessage::JoinRoom { .. } | ClientMessage::SubmitAnswer { .. }
        )
    }

    /// The capability token carried by an admin frame, if any.
    pub fn admin_token(&self) -> Option<&str> {
        match self {
            ClientMessage::JoinRoom { .. } | ClientMessage::SubmitAnswer { .. } => None,
            ClientMessage::StartSession { admin_token, .. }
            | ClientMessage::SetQuestion { admin_token, .. }
            | ClientMessage::NextQuestion { admin_token, .. }
            | ClientMessage::PrevQuestion { admin_token, .. }
            | ClientMessage::PauseTimer { admin_token, .. }
            | ClientMessage::ResumeTimer { admin_token, .. }
            | ClientMessage::LockAnswers { admin_token, .. }
            | ClientMessage::UnlockAnswers { admin_token, .. }
            | ClientMessage::RevealAnswer { admin_token, .. }
            | ClientMessage::EndSession { admin_token, .. } => admin_token.as_deref(),
        }
    }
}

/// Partial session configuration, merged over the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionOptionsPatch {
    /// Override for the auto-advance flag.
    #[serde(default)]
    pub auto_advance: Option<bool>,
    /// Override for the default time limit in seconds.
    #[serde(default)]
    pub default_time_limit: Option<u64>,
}

impl SessionOptionsPatch {
    /// Merge over a base configuration.
    pub fn apply(&self, base: SessionOptions) -> SessionOptions {
        SessionOptions {
            auto_advance: self.auto_advance.unwrap_or(base.auto_advance),
            default_time_limit: self.default_time_limit.unwrap_or(base.default_time_limit),
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to one connection or broadcast to a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full state snapshot, sent to a joining connection and on session
    /// start/end.
    StateSync(StateSync),

    /// Incremental question transition, broadcast on every change of the
    /// current question.
    QuestionUpdate(QuestionUpdate),

    /// Countdown paused at the carried instant.
    TimerPaused {
        /// Session identifier.
        session_id: String,
        /// Wall-clock instant the pause began, epoch millis.
        paused_at: i64,
    },

    /// Countdown resumed; clients re-anchor on the carried timestamp.
    TimerResumed {
        /// Session identifier.
        session_id: String,
        /// New countdown anchor, epoch millis.
        started_at: i64,
    },

    /// Submissions are now locked.
    AnswersLocked {
        /// Session identifier.
        session_id: String,
    },

    /// Submissions are unlocked.
    AnswersUnlocked {
        /// Session identifier.
        session_id: String,
    },

    /// Unicast acknowledgment to the submitter of an accepted answer.
    AnswerAck {
        /// Whether the choice matched the correct option.
        correct: bool,
        /// The submitter's new score.
        score: u64,
    },

    /// Unicast rejection to the submitter.
    AnswerRejected {
        /// Why the submission was not admitted.
        reason: RejectReason,
    },

    /// Broadcast to the room excluding the submitter.
    ScoreUpdate {
        /// Scoring participant.
        user_id: String,
        /// Their new score.
        score: u64,
        /// Whether their last answer was correct.
        last_correct: bool,
    },

    /// Current leaderboard, broadcast to the room.
    LeaderboardUpdate {
        /// Session identifier.
        session_id: String,
        /// Ordered rows, score descending.
        items: Vec<LeaderboardItem>,
    },

    /// Roster update, broadcast to the room.
    ParticipantsUpdate {
        /// Roster size.
        count: usize,
        /// Roster entries.
        items: Vec<ParticipantInfo>,
    },

    /// Signal to show the correct option.
    RevealAnswer {
        /// Session identifier.
        session_id: String,
    },

    /// Boundary error (malformed frame, denied admin command).
    Error {
        /// Human-readable message.
        message: String,
    },
}

/// Why an answer submission was not admitted. Expected, user-facing,
/// and part of normal operation; never logged as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// The countdown for the question had expired.
    Timeout,
    /// Answers are globally locked.
    Locked,
    /// This (participant, question) pair already answered.
    Duplicate,
    /// No session or no current question.
    Closed,
    /// Per-participant submission rate exceeded.
    RateLimit,
}

/// Full session snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSync {
    /// Mutation counter; receivers discard stale versions.
    pub version: u64,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Current question, if one is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<Question>,
    /// Countdown anchor, epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    /// Countdown duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
    /// Whether the countdown is paused.
    pub timer_paused: bool,
    /// Whether submissions are locked.
    pub answers_locked: bool,
    /// Current leaderboard.
    pub scoreboard: Vec<LeaderboardItem>,
    /// Quiz progression mode.
    pub quiz_mode: QuizMode,
}

/// Incremental question transition payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionUpdate {
    /// Session identifier.
    pub session_id: String,
    /// Version after the transition.
    pub version: u64,
    /// The newly current question.
    pub question: Question,
    /// Fresh countdown anchor, epoch millis.
    pub started_at: i64,
    /// Countdown duration in seconds.
    pub time_limit: u64,
}

/// One roster entry on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    /// Participant identifier.
    pub user_id: String,
    /// Display name.
    pub name: String,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Flat answer record suitable for binary export.
///
/// Tagged enums are not supported by bincode; flat structs like this one
/// are, which is why the protocol splits JSON and binary use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Participant identifier.
    pub user_id: String,
    /// Question identifier.
    pub question_id: String,
    /// Chosen option text.
    pub choice: String,
    /// Whether the choice was correct.
    pub correct: bool,
    /// Milliseconds from countdown anchor to submission.
    pub time_used_ms: i64,
    /// Submission instant, epoch millis.
    pub submitted_at: i64,
}

impl AnswerRecord {
    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::question::default_questions;

    #[test]
    fn test_client_message_json_roundtrip() {
        let msg = ClientMessage::SubmitAnswer {
            session_id: "s1".to_string(),
            user_id: "alice".to_string(),
            question_id: "q1".to_string(),
            choice: "John Rawls".to_string(),
            client_sent_at: 1234567890,
        };

        let json = msg.to_json().unwrap();
        let parsed = ClientMessage::from_json(&json).unwrap();

        if let ClientMessage::SubmitAnswer { user_id, choice, .. } = parsed {
            assert_eq!(user_id, "alice");
            assert_eq!(choice, "John Rawls");
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_join_room_tag_name() {
        let msg = ClientMessage::JoinRoom {
            session_id: "s1".to_string(),
            user_id: "alice".to_string(),
            name: "Alice".to_string(),
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"join_room\""));
    }

    #[test]
    fn test_admin_classification() {
        let join = ClientMessage::JoinRoom {
            session_id: "s1".to_string(),
            user_id: "alice".to_string(),
            name: "Alice".to_string(),
        };
        assert!(!join.is_admin());
        assert!(join.admin_token().is_none());

        let end = ClientMessage::EndSession {
            session_id: "s1".to_string(),
            admin_token: Some("tok".to_string()),
        };
        assert!(end.is_admin());
        assert_eq!(end.admin_token(), Some("tok"));
    }

    #[test]
    fn test_reject_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&RejectReason::RateLimit).unwrap(),
            "\"rate-limit\""
        );
        assert_eq!(
            serde_json::to_string(&RejectReason::Timeout).unwrap(),
            "\"timeout\""
        );
        let parsed: RejectReason = serde_json::from_str("\"duplicate\"").unwrap();
        assert_eq!(parsed, RejectReason::Duplicate);
    }

    #[test]
    fn test_server_message_json_roundtrip() {
        let msg = ServerMessage::QuestionUpdate(QuestionUpdate {
            session_id: "s1".to_string(),
            version: 7,
            question: default_questions().remove(0),
            started_at: 1_700_000_000_000,
            time_limit: 15,
        });

        let json = msg.to_json().unwrap();
        let parsed = ServerMessage::from_json(&json).unwrap();

        if let ServerMessage::QuestionUpdate(update) = parsed {
            assert_eq!(update.version, 7);
            assert_eq!(update.question.id, "q1");
            assert_eq!(update.time_limit, 15);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_options_patch_merge() {
        let patch = SessionOptionsPatch {
            auto_advance: None,
            default_time_limit: Some(30),
        };
        let merged = patch.apply(SessionOptions::default());
        assert!(merged.auto_advance);
        assert_eq!(merged.default_time_limit, 30);
    }

    #[test]
    fn test_start_session_minimal_json() {
        // Omitted optional fields must parse.
        let json = r#"{"type":"start_session","session_id":"s1"}"#;
        let parsed = ClientMessage::from_json(json).unwrap();
        if let ClientMessage::StartSession {
            session_id,
            options,
            questions,
            quiz_mode,
            admin_token,
        } = parsed
        {
            assert_eq!(session_id, "s1");
            assert!(options.is_none());
            assert!(questions.is_none());
            assert!(quiz_mode.is_none());
            assert!(admin_token.is_none());
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_answer_record_binary_roundtrip() {
        let record = AnswerRecord {
            user_id: "alice".to_string(),
            question_id: "q2".to_string(),
            choice: "Plato".to_string(),
            correct: true,
            time_used_ms: 4200,
            submitted_at: 1_700_000_004_200,
        };

        let bytes = record.to_bytes().unwrap();
        let parsed = AnswerRecord::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_state_sync_omits_empty_question() {
        let msg = ServerMessage::StateSync(StateSync {
            version: 3,
            status: SessionStatus::Ended,
            question: None,
            started_at: None,
            time_limit: None,
            timer_paused: false,
            answers_locked: false,
            scoreboard: Vec::new(),
            quiz_mode: QuizMode::Static,
        });
        let json = msg.to_json().unwrap();
        assert!(!json.contains("\"question\""));
        assert!(json.contains("\"ended\""));
    }
}
