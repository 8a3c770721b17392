//! QuizDeck Server
//!
//! Authoritative coordination core for live quiz sessions. Hosts drive
//! the session over a WebSocket control channel; participants join
//! rooms, receive question broadcasts, and submit answers that pass an
//! admission pipeline before scoring. All state for a session is owned
//! by a single coordinator task, so every operation observes and
//! produces a consistent snapshot without locks.
//!
//! ```text
//!                    ┌────────────────────┐
//!    WebSocket ────► │    QuizServer      │  accept loop, per-conn
//!    clients         │  (network::server) │  reader/writer tasks
//!                    └─────────┬──────────┘
//!                              │ CoordinatorEvent (mpsc)
//!                    ┌─────────▼──────────┐
//!                    │    Coordinator     │  session state machine,
//!                    │ (network::         │  admission pipeline,
//!                    │   coordinator)     │  deferred advances
//!                    └─────────┬──────────┘
//!                              │ owns
//!                    ┌─────────▼──────────┐
//!                    │    SessionStore    │  sessions, scores,
//!                    │   (quiz::store)    │  rate-limit windows
//!                    └────────────────────┘
//! ```
//!
//! The `core` module holds the deterministic primitives the layers
//! above rely on: the per-participant option shuffle and the
//! pause/resume-safe countdown arithmetic.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod network;
pub mod quiz;

pub use self::core::shuffle::{option_seed, shuffle_options};
pub use self::core::timer::{epoch_millis, remaining_ms};
pub use self::network::{ClientMessage, Coordinator, QuizServer, ServerConfig, ServerMessage};
pub use self::quiz::{Question, QuizMode, SessionState, SessionStore};

/// Crate version, stamped into startup logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum accepted submissions per user within the rate window.
pub const ANSWER_RATE_LIMIT: usize = 3;

/// Sliding rate-limit window in milliseconds.
pub const ANSWER_RATE_WINDOW_MS: i64 = 1000;

/// Delay between an accepted submission and the automatic advance to
/// the next question, in static mode.
pub const FEEDBACK_ADVANCE_DELAY_MS: u64 = 3000;

/// Default per-question countdown in seconds when neither the question
/// nor the session options override it.
pub const DEFAULT_TIME_LIMIT_SECS: u64 = 15;

/// Points awarded for a correct answer.
pub const CORRECT_ANSWER_POINTS: i64 = 1;
