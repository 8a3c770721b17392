//! Session Coordinator
//!
//! The protocol state machine. One coordinator task owns the session
//! store and the room registry, consuming inbound events from a single
//! mpsc channel: client frames forwarded by connection tasks, and
//! deferred advance events sent by timer tasks. Because every
//! state-affecting operation for a session runs to completion on this
//! one loop, no locking is needed around the store and the version
//! counter totally orders broadcasts.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::timer;
use crate::network::protocol::{
    ClientMessage, ParticipantInfo, QuestionUpdate, RejectReason, ServerMessage,
    SessionOptionsPatch, StateSync,
};
use crate::quiz::question::{Question, QuizMode};
use crate::quiz::state::{SessionState, SessionStatus, HOST_USER_ID};
use crate::quiz::{SessionOptions, SessionStore};
use crate::{ANSWER_RATE_LIMIT, ANSWER_RATE_WINDOW_MS, CORRECT_ANSWER_POINTS, FEEDBACK_ADVANCE_DELAY_MS};

/// Connection identifier assigned by the server on accept.
pub type ConnId = Uuid;

/// Handle to one connected client: its identifier plus the sender that
/// the connection task drains into the WebSocket sink.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Connection identifier.
    pub conn_id: ConnId,
    /// Per-connection outbound channel.
    pub sender: mpsc::Sender<ServerMessage>,
}

impl ClientHandle {
    /// Unicast a message to this connection. Send failures mean the
    /// connection is gone; the pending disconnect event cleans up.
    pub async fn send(&self, message: ServerMessage) {
        let _ = self.sender.send(message).await;
    }
}

/// Events consumed by the coordinator loop.
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// A parsed client frame, with the originating connection.
    Frame {
        /// Originating connection.
        client: ClientHandle,
        /// The frame.
        message: ClientMessage,
    },

    /// A connection closed.
    Disconnected {
        /// The closed connection.
        conn_id: ConnId,
    },

    /// A question's countdown elapsed without the session moving on.
    AdvanceElapsed {
        /// Session the timer was scheduled for.
        session_id: String,
        /// Question the timer was scheduled against. Dropped as stale
        /// if the current question has since changed.
        question_id: String,
    },

    /// The post-submission feedback window elapsed (static mode).
    FeedbackElapsed {
        /// Session the timer was scheduled for.
        session_id: String,
        /// Question the timer was scheduled against.
        question_id: String,
    },
}

/// The coordinator: session store, room registry, and the pending
/// deferred-advance handle per session. Room entries hold only the
/// outbound sender; connection identity lives in `conn_index`.
pub struct Coordinator {
    store: SessionStore,
    question_bank: Vec<Question>,
    rooms: BTreeMap<String, BTreeMap<ConnId, mpsc::Sender<ServerMessage>>>,
    conn_index: BTreeMap<ConnId, (String, String)>,
    /// At most one outstanding deferred advance per session, always
    /// replaced cancel-then-set.
    pending_advance: BTreeMap<String, JoinHandle<()>>,
    events_tx: mpsc::Sender<CoordinatorEvent>,
}

impl Coordinator {
    /// Create a coordinator. `events_tx` must be the sender side of the
    /// channel whose receiver is passed to [`Coordinator::run`]; timer
    /// tasks use it to deliver deferred advances back onto the loop.
    pub fn new(
        store: SessionStore,
        question_bank: Vec<Question>,
        events_tx: mpsc::Sender<CoordinatorEvent>,
    ) -> Self {
        Self {
            store,
            question_bank,
            rooms: BTreeMap::new(),
            conn_index: BTreeMap::new(),
            pending_advance: BTreeMap::new(),
            events_tx,
        }
    }

    /// Read access to the store, for listing surfaces.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Consume events until the channel closes.
    pub async fn run(mut self, mut events_rx: mpsc::Receiver<CoordinatorEvent>) {
        while let Some(event) = events_rx.recv().await {
            self.handle_event(event, timer::epoch_millis()).await;
        }

        for (_, handle) in std::mem::take(&mut self.pending_advance) {
            handle.abort();
        }
        info!("coordinator stopped");
    }

    /// Process one event at the given wall-clock instant.
    pub async fn handle_event(&mut self, event: CoordinatorEvent, now_ms: i64) {
        match event {
            CoordinatorEvent::Frame { client, message } => {
                self.handle_frame(client, message, now_ms).await;
            }
            CoordinatorEvent::Disconnected { conn_id } => {
                self.handle_disconnect(conn_id).await;
            }
            CoordinatorEvent::AdvanceElapsed {
                session_id,
                question_id,
            }
            | CoordinatorEvent::FeedbackElapsed {
                session_id,
                question_id,
            } => {
                self.handle_advance_due(&session_id, &question_id, now_ms)
                    .await;
            }
        }
    }

    async fn handle_frame(&mut self, client: ClientHandle, message: ClientMessage, now_ms: i64) {
        match message {
            ClientMessage::JoinRoom {
                session_id,
                user_id,
                name,
            } => {
                self.handle_join(client, &session_id, &user_id, &name, now_ms)
                    .await;
            }
            ClientMessage::SubmitAnswer {
                session_id,
                user_id,
                question_id,
                choice,
                ..
            } => {
                self.handle_submit(client, &session_id, &user_id, &question_id, &choice, now_ms)
                    .await;
            }
            ClientMessage::StartSession {
                session_id,
                options,
                questions,
                quiz_mode,
                ..
            } => {
                self.handle_start_session(client, &session_id, options, questions, quiz_mode, now_ms)
                    .await;
            }
            ClientMessage::SetQuestion {
                session_id,
                question_id,
                question,
                ..
            } => {
                self.handle_set_question(&session_id, question_id, question, now_ms)
                    .await;
            }
            ClientMessage::NextQuestion { session_id, .. } => {
                let next = self
                    .store
                    .get(&session_id)
                    .and_then(|s| s.question_after_current().cloned());
                if let Some(question) = next {
                    self.apply_question_transition(&session_id, question, now_ms)
                        .await;
                }
            }
            ClientMessage::PrevQuestion { session_id, .. } => {
                let prev = self
                    .store
                    .get(&session_id)
                    .and_then(|s| s.question_before_current().cloned());
                if let Some(question) = prev {
                    self.apply_question_transition(&session_id, question, now_ms)
                        .await;
                }
            }
            ClientMessage::PauseTimer { session_id, .. } => {
                self.handle_pause(&session_id, now_ms).await;
            }
            ClientMessage::ResumeTimer { session_id, .. } => {
                self.handle_resume(&session_id, now_ms).await;
            }
            ClientMessage::LockAnswers { session_id, .. } => {
                if self.store.update(&session_id, |s| s.answers_locked = true).is_some() {
                    self.broadcast(&session_id, ServerMessage::AnswersLocked {
                        session_id: session_id.clone(),
                    })
                    .await;
                }
            }
            ClientMessage::UnlockAnswers { session_id, .. } => {
                if self.store.update(&session_id, |s| s.answers_locked = false).is_some() {
                    self.broadcast(&session_id, ServerMessage::AnswersUnlocked {
                        session_id: session_id.clone(),
                    })
                    .await;
                }
            }
            ClientMessage::RevealAnswer { session_id, .. } => {
                self.broadcast(&session_id, ServerMessage::RevealAnswer {
                    session_id: session_id.clone(),
                })
                .await;
            }
            ClientMessage::EndSession { session_id, .. } => {
                self.end_session(&session_id).await;
            }
        }
    }

    /// Participant (or host) joins a session room. Membership is
    /// recorded even before the session exists, so a later start
    /// broadcast reaches early joiners.
    async fn handle_join(
        &mut self,
        client: ClientHandle,
        session_id: &str,
        user_id: &str,
        name: &str,
        now_ms: i64,
    ) {
        debug!(session_id, user_id, "join");
        self.join_room(session_id, user_id, &client);

        if self.store.get(session_id).is_none() {
            return;
        }

        let is_host = user_id == HOST_USER_ID;
        if !is_host {
            self.store.add_participant(session_id, user_id, name);
            self.store.update_leaderboard(session_id);
        }

        // Static-mode countdown anchors on the first real participant,
        // not at session start. Never re-anchor an ended session:
        // started_at is set iff a countdown is logically running.
        let should_anchor = !is_host
            && self
                .store
                .get(session_id)
                .map(|s| {
                    s.quiz_mode == QuizMode::Static
                        && s.status == SessionStatus::Running
                        && s.started_at.is_none()
                })
                .unwrap_or(false);
        if should_anchor {
            self.store.update(session_id, |s| s.started_at = Some(now_ms));
            info!(session_id, user_id, "anchored static countdown on first join");
            self.schedule_auto_advance(session_id, now_ms);
        }

        let Some(session) = self.store.get(session_id) else {
            return;
        };
        let snapshot = snapshot_of(session);
        let roster = roster_of(session);
        let leaderboard = ServerMessage::LeaderboardUpdate {
            session_id: session_id.to_string(),
            items: session.leaderboard.clone(),
        };

        client.send(ServerMessage::StateSync(snapshot)).await;

        if is_host {
            // The host gets the current roster and standings directly;
            // its arrival is not a roster change.
            client.send(roster).await;
            client.send(leaderboard).await;
        } else {
            self.broadcast(session_id, roster).await;
            self.broadcast(session_id, leaderboard).await;
        }
    }

    /// The answer admission pipeline: closed, duplicate, locked,
    /// timeout, rate-limit. First failure short-circuits with a
    /// rejection unicast to the submitter only. Marking as answered
    /// happens only on acceptance.
    async fn handle_submit(
        &mut self,
        client: ClientHandle,
        session_id: &str,
        user_id: &str,
        question_id: &str,
        choice: &str,
        now_ms: i64,
    ) {
        let (current, locked, started_at, time_limit, quiz_mode) = match self.store.get(session_id)
        {
            Some(session) => match &session.current_question {
                Some(q) => (
                    q.clone(),
                    session.answers_locked,
                    session.started_at,
                    session.time_limit,
                    session.quiz_mode,
                ),
                None => {
                    client
                        .send(ServerMessage::AnswerRejected {
                            reason: RejectReason::Closed,
                        })
                        .await;
                    return;
                }
            },
            None => {
                client
                    .send(ServerMessage::AnswerRejected {
                        reason: RejectReason::Closed,
                    })
                    .await;
                return;
            }
        };

        if self.store.has_answered(session_id, user_id, question_id) {
            client
                .send(ServerMessage::AnswerRejected {
                    reason: RejectReason::Duplicate,
                })
                .await;
            return;
        }

        if locked {
            client
                .send(ServerMessage::AnswerRejected {
                    reason: RejectReason::Locked,
                })
                .await;
            return;
        }

        if let (Some(started_at), Some(limit)) = (started_at, time_limit) {
            if timer::is_time_up(started_at, limit as i64 * 1000, now_ms) {
                client
                    .send(ServerMessage::AnswerRejected {
                        reason: RejectReason::Timeout,
                    })
                    .await;
                return;
            }
        }

        if !self
            .store
            .check_rate_limit(user_id, ANSWER_RATE_LIMIT, ANSWER_RATE_WINDOW_MS, now_ms)
        {
            client
                .send(ServerMessage::AnswerRejected {
                    reason: RejectReason::RateLimit,
                })
                .await;
            return;
        }

        let correct = choice == current.answer;
        self.store.mark_answered(session_id, user_id, question_id);
        let delta = if correct { CORRECT_ANSWER_POINTS } else { 0 };
        let score = self.store.update_score(user_id, delta);
        let leaderboard = self.store.update_leaderboard(session_id);

        debug!(session_id, user_id, question_id, correct, score, "answer accepted");

        client.send(ServerMessage::AnswerAck { correct, score }).await;
        self.broadcast_except(
            session_id,
            client.conn_id,
            ServerMessage::ScoreUpdate {
                user_id: user_id.to_string(),
                score,
                last_correct: correct,
            },
        )
        .await;
        self.broadcast(
            session_id,
            ServerMessage::LeaderboardUpdate {
                session_id: session_id.to_string(),
                items: leaderboard,
            },
        )
        .await;

        // Static mode gives the room a short feedback window after a
        // submission, replacing the deadline-based advance.
        if quiz_mode == QuizMode::Static {
            self.schedule_feedback_advance(session_id, &current.id);
        }
    }

    /// Create the session, mark it running, and broadcast the initial
    /// snapshot. Live mode defers question selection to the admin;
    /// static mode presents the first question immediately but anchors
    /// its countdown on the first participant join.
    async fn handle_start_session(
        &mut self,
        client: ClientHandle,
        session_id: &str,
        options: Option<SessionOptionsPatch>,
        questions: Option<Vec<Question>>,
        quiz_mode: Option<QuizMode>,
        _now_ms: i64,
    ) {
        let options = options
            .unwrap_or_default()
            .apply(SessionOptions::default());
        let questions = questions.unwrap_or_else(|| self.question_bank.clone());
        let quiz_mode = quiz_mode.unwrap_or_default();
        let default_limit = options.default_time_limit;

        let session = self
            .store
            .create_session(session_id, options, questions, quiz_mode);
        session.status = SessionStatus::Running;
        match quiz_mode {
            QuizMode::Static => {
                session.current_question = session.questions.first().cloned();
                session.time_limit = Some(
                    session
                        .current_question
                        .as_ref()
                        .map(|q| q.effective_time_limit(default_limit))
                        .unwrap_or(default_limit),
                );
            }
            QuizMode::Live => {
                session.current_question = None;
                session.started_at = None;
                session.time_limit = Some(default_limit);
            }
        }

        info!(session_id, ?quiz_mode, "session started");

        // The starting connection is the host; it joins the room so it
        // receives roster and leaderboard updates.
        self.join_room(session_id, HOST_USER_ID, &client);

        let snapshot = self
            .store
            .get(session_id)
            .map(snapshot_of)
            .expect("session just created");
        self.broadcast(session_id, ServerMessage::StateSync(snapshot))
            .await;

        if quiz_mode == QuizMode::Static {
            debug!(session_id, "static countdown awaits first participant");
        }
    }

    async fn handle_set_question(
        &mut self,
        session_id: &str,
        question_id: Option<String>,
        question: Option<Question>,
        now_ms: i64,
    ) {
        let Some(session) = self.store.get(session_id) else {
            return;
        };

        let target = if let Some(inline) = question {
            Some(inline)
        } else if let Some(id) = question_id {
            session.find_question(&id).cloned()
        } else {
            None
        };

        let Some(target) = target else {
            debug!(session_id, "set_question target not found");
            return;
        };
        self.apply_question_transition(session_id, target, now_ms)
            .await;
    }

    /// The single question-transition path: cancels any pending
    /// deferred advance, re-anchors the countdown, clears the
    /// answered-marker set before the announcing broadcast, bumps the
    /// version, and in static mode schedules the next deadline advance.
    async fn apply_question_transition(
        &mut self,
        session_id: &str,
        question: Question,
        now_ms: i64,
    ) {
        if self
            .store
            .get(session_id)
            .map(|s| s.status == SessionStatus::Ended)
            .unwrap_or(true)
        {
            return;
        }

        self.cancel_pending_advance(session_id);

        let question_for_update = question.clone();
        let Some(version) = self.store.update(session_id, |s| {
            // An inline payload not yet in the list is appended so the
            // current question stays a member of the question list.
            if s.find_question(&question_for_update.id).is_none() {
                s.questions.push(question_for_update.clone());
            }
            let limit = question_for_update.effective_time_limit(s.options.default_time_limit);
            s.current_question = Some(question_for_update.clone());
            s.started_at = Some(now_ms);
            s.time_limit = Some(limit);
            s.clear_answered();
        }) else {
            return;
        };

        let time_limit = self
            .store
            .get(session_id)
            .and_then(|s| s.time_limit)
            .unwrap_or_default();

        info!(session_id, question_id = %question.id, version, "question transition");

        self.broadcast(
            session_id,
            ServerMessage::QuestionUpdate(QuestionUpdate {
                session_id: session_id.to_string(),
                version,
                question,
                started_at: now_ms,
                time_limit,
            }),
        )
        .await;

        let is_static = self
            .store
            .get(session_id)
            .map(|s| s.quiz_mode == QuizMode::Static)
            .unwrap_or(false);
        if is_static {
            self.schedule_auto_advance(session_id, now_ms);
        }
    }

    /// A deferred advance fired. Dropped as stale when the question it
    /// was scheduled against is no longer current.
    async fn handle_advance_due(&mut self, session_id: &str, question_id: &str, now_ms: i64) {
        let Some(session) = self.store.get(session_id) else {
            return;
        };
        if session.status != SessionStatus::Running {
            return;
        }
        match &session.current_question {
            Some(current) if current.id == question_id => {}
            _ => {
                debug!(session_id, question_id, "stale deferred advance dropped");
                return;
            }
        }

        if let Some(next) = session.question_after_current().cloned() {
            self.apply_question_transition(session_id, next, now_ms)
                .await;
        } else {
            info!(session_id, "all questions exhausted");
            self.end_session(session_id).await;
        }
    }

    /// Pause a running countdown. No-op if already paused.
    async fn handle_pause(&mut self, session_id: &str, now_ms: i64) {
        let paused = self
            .store
            .get(session_id)
            .map(|s| s.timer_paused)
            .unwrap_or(true);
        if paused {
            return;
        }

        self.store.update(session_id, |s| {
            s.timer_paused = true;
            s.paused_at = Some(now_ms);
        });
        self.broadcast(
            session_id,
            ServerMessage::TimerPaused {
                session_id: session_id.to_string(),
                paused_at: now_ms,
            },
        )
        .await;
    }

    /// Resume a paused countdown. Re-anchors `started_at` so the
    /// remaining time is exactly what it was at the pause instant,
    /// however long the pause lasted.
    async fn handle_resume(&mut self, session_id: &str, now_ms: i64) {
        let Some(session) = self.store.get(session_id) else {
            return;
        };
        if !session.timer_paused {
            return;
        }

        let elapsed_before_pause = match session.started_at {
            Some(started_at) => session
                .paused_at
                .map(|paused_at| paused_at - started_at)
                .unwrap_or(now_ms - started_at),
            None => 0,
        };
        let resumed_started_at = now_ms - elapsed_before_pause;

        self.store.update(session_id, |s| {
            s.timer_paused = false;
            s.started_at = Some(resumed_started_at);
            s.paused_at = None;
        });
        self.broadcast(
            session_id,
            ServerMessage::TimerResumed {
                session_id: session_id.to_string(),
                started_at: resumed_started_at,
            },
        )
        .await;
    }

    /// Terminal transition: cancel any pending advance, mark ended,
    /// clear the live question, broadcast the terminal snapshot. The
    /// store entry is retained for late score queries.
    async fn end_session(&mut self, session_id: &str) {
        self.cancel_pending_advance(session_id);

        let updated = self.store.update(session_id, |s| {
            s.status = SessionStatus::Ended;
            s.current_question = None;
            s.started_at = None;
            s.time_limit = None;
            s.timer_paused = false;
            s.paused_at = None;
            s.answers_locked = false;
        });
        if updated.is_none() {
            return;
        }

        info!(session_id, "session ended");
        let snapshot = self
            .store
            .get(session_id)
            .map(snapshot_of)
            .expect("session updated above");
        self.broadcast(session_id, ServerMessage::StateSync(snapshot))
            .await;
    }

    /// Connection closed: mark the participant disconnected (the roster
    /// entry is retained) and let the room know.
    async fn handle_disconnect(&mut self, conn_id: ConnId) {
        let Some((session_id, user_id)) = self.conn_index.remove(&conn_id) else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&session_id) {
            room.remove(&conn_id);
        }

        if user_id == HOST_USER_ID {
            return;
        }

        self.store.remove_participant(&session_id, &user_id);
        let leaderboard = self.store.update_leaderboard(&session_id);

        let Some(session) = self.store.get(&session_id) else {
            return;
        };
        debug!(session_id, user_id, "participant disconnected");
        let roster = roster_of(session);
        self.broadcast(&session_id, roster).await;
        self.broadcast(
            &session_id,
            ServerMessage::LeaderboardUpdate {
                session_id: session_id.clone(),
                items: leaderboard,
            },
        )
        .await;
    }

    // -------------------------------------------------------------------------
    // Deferred advance scheduling
    // -------------------------------------------------------------------------

    /// Schedule the deadline advance for the current question, replacing
    /// any outstanding deferred advance for the session.
    fn schedule_auto_advance(&mut self, session_id: &str, now_ms: i64) {
        let Some(session) = self.store.get(session_id) else {
            return;
        };
        let (Some(question), Some(started_at), Some(limit)) = (
            session.current_question.as_ref(),
            session.started_at,
            session.time_limit,
        ) else {
            debug!(session_id, "auto-advance not scheduled, countdown not anchored");
            return;
        };

        let delay = timer::remaining_ms(started_at, limit as i64 * 1000, now_ms);
        let event = CoordinatorEvent::AdvanceElapsed {
            session_id: session_id.to_string(),
            question_id: question.id.clone(),
        };
        debug!(session_id, question_id = %question.id, delay, "auto-advance scheduled");
        self.spawn_advance(session_id, delay as u64, event);
    }

    /// Schedule the fixed post-submission feedback advance, replacing
    /// any outstanding deferred advance for the session.
    fn schedule_feedback_advance(&mut self, session_id: &str, question_id: &str) {
        let event = CoordinatorEvent::FeedbackElapsed {
            session_id: session_id.to_string(),
            question_id: question_id.to_string(),
        };
        debug!(session_id, question_id, "feedback advance scheduled");
        self.spawn_advance(session_id, FEEDBACK_ADVANCE_DELAY_MS, event);
    }

    fn spawn_advance(&mut self, session_id: &str, delay_ms: u64, event: CoordinatorEvent) {
        let events_tx = self.events_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if events_tx.send(event).await.is_err() {
                warn!("coordinator gone, deferred advance dropped");
            }
        });

        // Cancel-then-set keeps at most one outstanding advance per
        // session; two live timers against one session can double-advance.
        if let Some(previous) = self
            .pending_advance
            .insert(session_id.to_string(), handle)
        {
            previous.abort();
        }
    }

    fn cancel_pending_advance(&mut self, session_id: &str) {
        if let Some(handle) = self.pending_advance.remove(session_id) {
            handle.abort();
        }
    }

    // -------------------------------------------------------------------------
    // Room plumbing
    // -------------------------------------------------------------------------

    fn join_room(&mut self, session_id: &str, user_id: &str, client: &ClientHandle) {
        self.rooms
            .entry(session_id.to_string())
            .or_default()
            .insert(client.conn_id, client.sender.clone());
        self.conn_index
            .insert(client.conn_id, (session_id.to_string(), user_id.to_string()));
    }

    /// Send to every connection in the session's room.
    async fn broadcast(&self, session_id: &str, message: ServerMessage) {
        let Some(room) = self.rooms.get(session_id) else {
            return;
        };
        for sender in room.values() {
            let _ = sender.send(message.clone()).await;
        }
    }

    /// Send to every connection in the room except one.
    async fn broadcast_except(&self, session_id: &str, exclude: ConnId, message: ServerMessage) {
        let Some(room) = self.rooms.get(session_id) else {
            return;
        };
        for (conn_id, sender) in room {
            if *conn_id != exclude {
                let _ = sender.send(message.clone()).await;
            }
        }
    }
}

/// Full snapshot of a session for `state_sync`.
fn snapshot_of(session: &SessionState) -> StateSync {
    StateSync {
        version: session.version,
        status: session.status,
        question: session.current_question.clone(),
        started_at: session.started_at,
        time_limit: session.time_limit,
        timer_paused: session.timer_paused,
        answers_locked: session.answers_locked,
        scoreboard: session.leaderboard.clone(),
        quiz_mode: session.quiz_mode,
    }
}

/// Roster payload. Retained-but-disconnected entries are included; the
/// roster reflects everyone who joined, not momentary connectivity.
fn roster_of(session: &SessionState) -> ServerMessage {
    ServerMessage::ParticipantsUpdate {
        count: session.participants.len(),
        items: session
            .participants
            .iter()
            .map(|(user_id, p)| ParticipantInfo {
                user_id: user_id.clone(),
                name: p.name.clone(),
            })
            .collect(),
    }
}
