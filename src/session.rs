//! Debate session state owned by the caller

use crate::registry::EntityId;
use crate::types::{SessionId, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whose turn is next within the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Contestant A speaks next
    #[default]
    ATurn,
    /// Contestant B speaks next
    BTurn,
    /// The moderator speaks next
    ModeratorTurn,
}

impl Phase {
    /// Entity that speaks in this phase
    pub fn entity(self) -> EntityId {
        match self {
            Self::ATurn => EntityId::ContestantA,
            Self::BTurn => EntityId::ContestantB,
            Self::ModeratorTurn => EntityId::Moderator,
        }
    }

    /// Following phase in the fixed cycle
    pub fn next(self) -> Self {
        match self {
            Self::ATurn => Self::BTurn,
            Self::BTurn => Self::ModeratorTurn,
            Self::ModeratorTurn => Self::ATurn,
        }
    }

    /// Whether completing this phase closes the round
    pub fn closes_round(self) -> bool {
        matches!(self, Self::ModeratorTurn)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ATurn => write!(f, "A_TURN"),
            Self::BTurn => write!(f, "B_TURN"),
            Self::ModeratorTurn => write!(f, "MODERATOR_TURN"),
        }
    }
}

/// One completed turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    /// Entity that spoke
    pub entity: EntityId,
    /// Display name of the speaker
    pub speaker: String,
    /// Full reply text
    pub text: String,
    /// Round the turn belongs to
    pub round: u32,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Tokens consumed by the turn
    pub usage: TokenUsage,
}

impl Utterance {
    /// `(speaker, text)` pair for presenters
    pub fn as_pair(&self) -> (&str, &str) {
        (&self.speaker, &self.text)
    }

    /// Line appended to the rolling summary for this turn
    pub fn summary_line(&self) -> String {
        format!("{}: {}", self.speaker, self.text)
    }
}

/// State of one debate.
///
/// Mutated only by [`DebateOrchestrator`](crate::orchestrator::DebateOrchestrator),
/// which commits a whole turn or nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    id: SessionId,
    topic: Option<String>,
    summary: String,
    round: u32,
    phase: Phase,
    transcript: Vec<Utterance>,
    usage: TokenUsage,
}

impl Default for DebateSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DebateSession {
    /// Fresh session with a random id
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    /// Fresh session with a given id, e.g. to resume persistent memory
    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            topic: None,
            summary: String::new(),
            round: 1,
            phase: Phase::ATurn,
            transcript: Vec::new(),
            usage: TokenUsage::default(),
        }
    }

    /// Session id, stable across resets
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Topic, once the first turn has committed
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Rolling summary passed to the next turn
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Current round, starting at 1
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Entity whose turn is next
    pub fn next_speaker(&self) -> EntityId {
        self.phase.entity()
    }

    /// Committed utterances in order
    pub fn transcript(&self) -> &[Utterance] {
        &self.transcript
    }

    /// Tokens consumed so far
    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Whether the next turn is the very first of the session
    pub fn awaiting_topic(&self) -> bool {
        self.topic.is_none() && self.round == 1 && self.phase == Phase::ATurn
    }

    /// Summary after `utterance` is folded in.
    ///
    /// Contestants append `"{speaker}: {text}\n"`; the moderator replaces the
    /// whole summary with `"{speaker}: {text}"`.
    ///
    /// A moderator digest carries no trailing newline, so the first contestant
    /// line after it is preceded by a single `\n` separator. Contestant lines
    /// already end in `\n` and get nothing extra.
    pub fn next_summary(&self, utterance: &Utterance) -> String {
        if utterance.entity.is_moderator() {
            return utterance.summary_line();
        }

        let mut summary = self.summary.clone();
        if !summary.is_empty() && !summary.ends_with('\n') {
            summary.push('\n');
        }
        summary.push_str(&utterance.summary_line());
        summary.push('\n');
        summary
    }

    /// Apply a finished turn. Callers must have completed every fallible step first.
    pub(crate) fn commit(&mut self, topic: Option<String>, utterance: Utterance) {
        if self.topic.is_none() {
            self.topic = topic;
        }
        self.summary = self.next_summary(&utterance);
        self.usage.add(utterance.usage);
        self.transcript.push(utterance);

        if self.phase.closes_round() {
            self.round += 1;
        }
        self.phase = self.phase.next();
    }

    /// Back to the initial state, keeping the session id
    pub(crate) fn clear(&mut self) {
        *self = Self::with_id(self.id);
    }
}
