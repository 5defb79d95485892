//! Per-turn state threaded through the graph.

use crate::store::Passage;
use crate::types::{Message, Role};
use serde::{Deserialize, Serialize};

/// Normalise a single-token model reply: trim, drop surrounding quotes,
/// markdown emphasis and trailing punctuation, uppercase, and join words with `_`.
pub(crate) fn normalize_token(raw: &str) -> String {
    const QUOTES: &[char] = &['"', '\'', '`', '*', '_', '「', '」', '“', '”'];
    const TRAILING: &[char] = &['.', '!', '?', ':', '。', '！', '．'];

    raw.trim()
        .trim_matches(QUOTES)
        .trim_end_matches(TRAILING)
        .trim_matches(QUOTES)
        .trim()
        .to_uppercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Whether a question needs private-document search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchDecision {
    Search,
    #[default]
    NoSearch,
}

impl SearchDecision {
    /// Parse a normalised reply. `None` when it is neither token.
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "SEARCH" => Some(SearchDecision::Search),
            "NO_SEARCH" => Some(SearchDecision::NoSearch),
            _ => None,
        }
    }

    /// Parse a model reply, falling back to the default for anything unrecognised.
    pub fn from_model_output(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| {
            tracing::warn!(raw = %raw, "Unrecognised search decision, defaulting to NO_SEARCH");
            SearchDecision::default()
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDecision::Search => "SEARCH",
            SearchDecision::NoSearch => "NO_SEARCH",
        }
    }
}

impl std::fmt::Display for SearchDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Judgement of a generated answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerVerdict {
    Good,
    Bad,
}

impl AnswerVerdict {
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "GOOD" => Some(AnswerVerdict::Good),
            "BAD" => Some(AnswerVerdict::Bad),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerVerdict::Good => "GOOD",
            AnswerVerdict::Bad => "BAD",
        }
    }
}

impl std::fmt::Display for AnswerVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable record for one conversational turn.
///
/// Seeded with the transcript so far plus the new human message. Only
/// `messages` outlives the turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnState {
    /// Conversation transcript; this turn appends exactly one assistant message.
    pub messages: Vec<Message>,
    /// Content of the last message at the start of the turn.
    pub question: String,
    /// Retrieved passages joined by a blank line, or empty.
    pub context: String,
    /// Passages behind `context`, in rank order.
    pub passages: Vec<Passage>,
    /// Parsed search decision; set before any answer is generated.
    pub decision: Option<SearchDecision>,
    /// Model reply the decision was parsed from.
    pub raw_decision: Option<String>,
    /// Parsed evaluation verdict, when the evaluation step ran and understood the reply.
    pub evaluation: Option<AnswerVerdict>,
    /// Model reply the verdict was parsed from.
    pub raw_evaluation: Option<String>,
    /// Fresh answers still allowed after a `BAD` verdict.
    pub regenerations_remaining: usize,
    /// Position of this turn's assistant message in `messages`.
    answer_index: Option<usize>,
}

impl TurnState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_regenerations(mut self, budget: usize) -> Self {
        self.regenerations_remaining = budget;
        self
    }

    /// Record this turn's answer. A second call replaces the first answer
    /// rather than appending another assistant message.
    pub fn set_answer(&mut self, text: impl Into<String>) {
        let message = Message::assistant(text);
        match self.answer_index {
            Some(index) if index < self.messages.len() => self.messages[index] = message,
            _ => {
                self.messages.push(message);
                self.answer_index = Some(self.messages.len() - 1);
            }
        }
    }

    /// This turn's answer, if one has been generated.
    pub fn answer(&self) -> Option<&str> {
        self.answer_index
            .and_then(|i| self.messages.get(i))
            .map(|m| m.content.as_str())
    }

    /// Number of assistant messages in the transcript.
    pub fn assistant_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }
}
