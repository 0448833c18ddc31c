// Moderation domain models - data structures for the probation/classifier core.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts an `Action` into deletes and admin DMs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform user id of a chat member.
pub type MemberId = u64;

/// Trust level of a member. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberState {
    /// Joined, has not sent a clean message yet
    New,
    /// Has sent clean messages but not enough to be trusted
    Probation,
    /// Normal participant. Also the state of every untracked member.
    Trusted,
}

impl MemberState {
    /// Whether probation-only rules apply to messages from this member.
    pub fn is_on_probation(self) -> bool {
        matches!(self, MemberState::New | MemberState::Probation)
    }

    /// Stable lowercase name, the same one used in persisted data.
    pub fn as_str(self) -> &'static str {
        match self {
            MemberState::New => "new",
            MemberState::Probation => "probation",
            MemberState::Trusted => "trusted",
        }
    }
}

impl std::str::FromStr for MemberState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(MemberState::New),
            "probation" => Ok(MemberState::Probation),
            "trusted" => Ok(MemberState::Trusted),
            other => Err(format!("unknown member state '{}'", other)),
        }
    }
}

impl std::fmt::Display for MemberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberState::New => write!(f, "New"),
            MemberState::Probation => write!(f, "Probation"),
            MemberState::Trusted => write!(f, "Trusted"),
        }
    }
}

/// A tracked member. Owned exclusively by the probation registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub joined_at: DateTime<Utc>,
    pub state: MemberState,
    /// Messages sent without a positive classifier hit
    pub clean_message_count: u32,
}

impl Member {
    pub fn new(id: MemberId, joined_at: DateTime<Utc>) -> Self {
        Self {
            id,
            joined_at,
            state: MemberState::New,
            clean_message_count: 0,
        }
    }
}

/// Categorical judgment of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Clean,
    Suspicious,
    Spam,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Clean => write!(f, "Clean"),
            Verdict::Suspicious => write!(f, "Suspicious"),
            Verdict::Spam => write!(f, "Spam"),
        }
    }
}

/// Outcome of classifying one message.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// Sum of the weights of every rule that fired
    pub score: f64,
    /// Labels of the rules that fired, in rule-set order
    pub matched_rules: Vec<String>,
    pub verdict: Verdict,
}

impl ClassificationResult {
    /// Result for text that matched nothing.
    pub fn clean() -> Self {
        Self {
            score: 0.0,
            matched_rules: Vec::new(),
            verdict: Verdict::Clean,
        }
    }
}

/// What the delivery layer should do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Forward normally
    Allow,
    /// Leave the message but alert the admins
    FlagForAdmin,
    /// Delete the message and report it to the admins
    Suppress,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Allow => write!(f, "Allow"),
            ActionKind::FlagForAdmin => write!(f, "Flag for admin"),
            ActionKind::Suppress => write!(f, "Suppress"),
        }
    }
}

/// Audit information attached to every action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReason {
    pub matched_rules: Vec<String>,
    pub member_state: MemberState,
    pub score: f64,
}

/// Moderation decision handed to the delivery layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub reason: ActionReason,
}

impl Action {
    pub fn new(kind: ActionKind, result: ClassificationResult, member_state: MemberState) -> Self {
        Self {
            kind,
            reason: ActionReason {
                matched_rules: result.matched_rules,
                member_state,
                score: result.score,
            },
        }
    }
}

/// Score cut-offs: `score < suspicious` is clean, `score >= spam` is spam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreThresholds {
    pub suspicious: f64,
    pub spam: f64,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            suspicious: 5.0,
            spam: 10.0,
        }
    }
}

/// When a member graduates from probation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbationConfig {
    /// Clean messages needed to become trusted
    pub clean_messages_to_trust: u32,
    /// Seconds after joining after which a member is trusted anyway
    pub window_secs: u64,
}

impl Default for ProbationConfig {
    fn default() -> Self {
        Self {
            clean_messages_to_trust: 5, // 5 clean messages...
            window_secs: 72 * 60 * 60,  // ...or 3 days in the group
        }
    }
}

impl ProbationConfig {
    pub fn window(&self) -> chrono::Duration {
        i64::try_from(self.window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}
