//! Quiz Domain State
//!
//! Sessions, questions, scores, and the leaderboard ledger. No knowledge
//! of the transport; all I/O lives in `network/`.
//!
//! ## Module Structure
//!
//! - `question`: question types, quiz mode, question bank loading
//! - `state`: per-session mutable state and projections
//! - `store`: the authoritative store, score ledger, rate limiter

pub mod question;
pub mod state;
pub mod store;

// Re-export key types
pub use question::{default_questions, load_questions, Question, QuizMode};
pub use state::{
    LeaderboardItem, Participant, SessionOptions, SessionState, SessionStatus, SessionSummary,
    HOST_USER_ID,
};
pub use store::SessionStore;
