// Rule-based message classifier.
//
// Deterministic and side-effect free: the same rule set, text and sender
// state always produce the same result. Safe to share across tasks.

use super::moderation_config::ModerationConfig;
use super::moderation_models::{ClassificationResult, MemberState, ScoreThresholds, Verdict};
use super::rules::RuleSet;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// Invalid moderation policy. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid rule '{label}': {reason}")]
    InvalidRule { label: String, reason: String },

    #[error("Duplicate rule label '{0}'")]
    DuplicateLabel(String),

    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("Invalid probation settings: {0}")]
    InvalidProbation(String),

    #[error("Unreadable moderation config: {0}")]
    Unreadable(String),
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct Classifier {
    rules: RuleSet,
    thresholds: ScoreThresholds,
}

impl Classifier {
    /// Build a classifier, validating the thresholds.
    ///
    /// Requires `0 < suspicious < spam` so that a message with no matches
    /// (score 0) is always clean.
    pub fn new(rules: RuleSet, thresholds: ScoreThresholds) -> Result<Self, ConfigurationError> {
        let ScoreThresholds { suspicious, spam } = thresholds;

        if !suspicious.is_finite() || !spam.is_finite() {
            return Err(ConfigurationError::InvalidThresholds(
                "thresholds must be finite numbers".to_string(),
            ));
        }
        if suspicious <= 0.0 {
            return Err(ConfigurationError::InvalidThresholds(format!(
                "suspicious threshold must be positive, got {}",
                suspicious
            )));
        }
        if suspicious >= spam {
            return Err(ConfigurationError::InvalidThresholds(format!(
                "suspicious threshold ({}) must be lower than spam threshold ({})",
                suspicious, spam
            )));
        }

        if rules.is_empty() {
            tracing::warn!("Moderation policy has no rules, every message will be clean");
        }

        Ok(Self { rules, thresholds })
    }

    /// Compile the rule set and thresholds from a loaded policy.
    pub fn from_config(config: &ModerationConfig) -> Result<Self, ConfigurationError> {
        let rules = RuleSet::compile(&config.rules)?;
        Self::new(rules, config.thresholds)
    }

    pub fn thresholds(&self) -> ScoreThresholds {
        self.thresholds
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Classify a message from a sender in the given state.
    ///
    /// Probation-only rules are skipped for trusted senders. Empty or
    /// whitespace-only text is always clean.
    pub fn classify(&self, text: &str, sender_state: MemberState) -> ClassificationResult {
        if text.trim().is_empty() {
            return ClassificationResult::clean();
        }

        let lowercased = text.to_lowercase();
        let on_probation = sender_state.is_on_probation();

        let mut score = 0.0;
        let mut matched_rules = Vec::new();

        for rule in self.rules.iter() {
            if rule.is_probation_only() && !on_probation {
                continue;
            }
            if rule.matches(text, &lowercased) {
                score += rule.weight();
                matched_rules.push(rule.label().to_string());
            }
        }

        ClassificationResult {
            score,
            matched_rules,
            verdict: self.verdict_for(score),
        }
    }

    fn verdict_for(&self, score: f64) -> Verdict {
        if score >= self.thresholds.spam {
            Verdict::Spam
        } else if score >= self.thresholds.suspicious {
            Verdict::Suspicious
        } else {
            Verdict::Clean
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
