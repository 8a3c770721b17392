//! Questions and the Question Bank
//!
//! Single-choice questions with an ordered option list. The bank loads
//! from a JSON file when available and falls back to a small built-in
//! set, so a missing or malformed file never fails a session.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::shuffle::shuffle_options;

/// Quiz progression mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizMode {
    /// Admin manually advances questions.
    #[default]
    Live,
    /// Server auto-advances on timeout or shortly after a submission.
    Static,
}

/// A single-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier within a session's question list.
    pub id: String,
    /// Display order index (1-based).
    pub index: u32,
    /// Question text.
    pub text: String,
    /// Ordered option strings (unshuffled).
    pub options: Vec<String>,
    /// The correct option. Must be an exact member of `options`.
    pub answer: String,
    /// Per-question override of the session's default time limit (seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
}

impl Question {
    /// Whether the correct answer is actually one of the options.
    pub fn is_well_formed(&self) -> bool {
        self.options.contains(&self.answer)
    }

    /// Effective time limit, given the session default.
    pub fn effective_time_limit(&self, default_secs: u64) -> u64 {
        self.time_limit.unwrap_or(default_secs)
    }

    /// The option ordering one participant sees for this question.
    ///
    /// Stable per (participant, question); clients compute the same
    /// ordering locally, so answer letters stay positional.
    pub fn options_for(&self, user_id: &str) -> Vec<String> {
        shuffle_options(&self.options, user_id, &self.id)
    }
}

/// Built-in fallback question set.
pub fn default_questions() -> Vec<Question> {
    vec![
        Question {
            id: "q1".to_string(),
            index: 1,
            text: "Which philosopher proposed the \"veil of ignorance\"?".to_string(),
            options: vec![
                "Immanuel Kant".to_string(),
                "John Stuart Mill".to_string(),
                "John Rawls".to_string(),
                "Robert Nozick".to_string(),
            ],
            answer: "John Rawls".to_string(),
            time_limit: Some(15),
        },
        Question {
            id: "q2".to_string(),
            index: 2,
            text: "What is the main principle of utilitarianism?".to_string(),
            options: vec![
                "Greatest happiness for the greatest number".to_string(),
                "Categorical imperative".to_string(),
                "Social contract".to_string(),
                "Virtue ethics".to_string(),
            ],
            answer: "Greatest happiness for the greatest number".to_string(),
            time_limit: Some(20),
        },
        Question {
            id: "q3".to_string(),
            index: 3,
            text: "Who wrote \"The Republic\"?".to_string(),
            options: vec![
                "Aristotle".to_string(),
                "Plato".to_string(),
                "Socrates".to_string(),
                "Confucius".to_string(),
            ],
            answer: "Plato".to_string(),
            time_limit: Some(10),
        },
    ]
}

/// Load the question bank from a JSON file, falling back to the
/// built-in set on any read or parse failure.
pub fn load_questions(path: Option<&Path>) -> Vec<Question> {
    let Some(path) = path else {
        return default_questions();
    };

    match std::fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str::<Vec<Question>>(&data) {
            Ok(questions) if !questions.is_empty() => questions,
            Ok(_) => {
                warn!("question bank {} is empty, using defaults", path.display());
                default_questions()
            }
            Err(e) => {
                warn!("failed to parse question bank {}: {}", path.display(), e);
                default_questions()
            }
        },
        Err(e) => {
            warn!("failed to read question bank {}: {}", path.display(), e);
            default_questions()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_questions_well_formed() {
        let questions = default_questions();
        assert_eq!(questions.len(), 3);
        for q in &questions {
            assert!(q.is_well_formed());
            assert!(q.options.len() >= 2);
        }
    }

    #[test]
    fn test_effective_time_limit() {
        let mut q = default_questions().remove(0);
        assert_eq!(q.effective_time_limit(30), 15);
        q.time_limit = None;
        assert_eq!(q.effective_time_limit(30), 30);
    }

    #[test]
    fn test_options_for_is_stable() {
        let q = default_questions().remove(0);
        assert_eq!(q.options_for("alice"), q.options_for("alice"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let questions = load_questions(Some(Path::new("/nonexistent/questions.json")));
        assert_eq!(questions, default_questions());
    }

    #[test]
    fn test_load_none_uses_defaults() {
        assert_eq!(load_questions(None), default_questions());
    }

    #[test]
    fn test_question_json_roundtrip() {
        let q = default_questions().remove(1);
        let json = serde_json::to_string(&q).unwrap();
        let parsed: Question = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, q);
    }

    #[test]
    fn test_quiz_mode_wire_names() {
        assert_eq!(serde_json::to_string(&QuizMode::Live).unwrap(), "\"live\"");
        assert_eq!(serde_json::to_string(&QuizMode::Static).unwrap(), "\"static\"");
    }
}
