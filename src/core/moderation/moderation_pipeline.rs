// Moderation pipeline - turns inbound chat events into actions.
//
// The pipeline never talks to the chat platform. It returns an `Action` and
// the Discord layer carries it out after we're done, so network latency
// never sits inside a moderation decision.

use super::classifier::Classifier;
use super::moderation_models::{Action, ActionKind, MemberId, Verdict};
use super::probation_registry::{ProbationRegistry, ProbationStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct ModerationPipeline<S: ProbationStore> {
    classifier: Classifier,
    registry: Arc<ProbationRegistry<S>>,
}

impl<S: ProbationStore> ModerationPipeline<S> {
    pub fn new(classifier: Classifier, registry: Arc<ProbationRegistry<S>>) -> Self {
        Self {
            classifier,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ProbationRegistry<S>> {
        &self.registry
    }

    /// A member joined the group. Duplicate joins are absorbed by the registry.
    pub fn handle_join(&self, member_id: MemberId, now: DateTime<Utc>) {
        self.registry.enroll(member_id, now);
    }

    /// Decide what to do with a message.
    ///
    /// Only clean messages count towards probation; suspicious ones are left
    /// to a human and spam is suppressed.
    pub fn handle_message(&self, member_id: MemberId, text: &str, now: DateTime<Utc>) -> Action {
        let state = self.registry.observe(member_id, now);
        let result = self.classifier.classify(text, state);

        let kind = match result.verdict {
            Verdict::Spam => ActionKind::Suppress,
            Verdict::Suspicious => ActionKind::FlagForAdmin,
            Verdict::Clean => {
                self.registry.record_clean_message(member_id, now);
                ActionKind::Allow
            }
        };

        if kind != ActionKind::Allow {
            tracing::info!(
                member_id,
                state = %state,
                verdict = %result.verdict,
                score = result.score,
                rules = ?result.matched_rules,
                action = %kind,
                "Moderation decision"
            );
        }

        Action::new(kind, result, state)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::{
        MemberState, ProbationConfig, ScoreThresholds,
    };
    use crate::core::moderation::probation_registry::tests::{t0, MockProbationStore};
    use crate::core::moderation::rules::{RuleConfig, RuleSet};
    use chrono::Duration;

    fn pipeline(
        rules: Vec<RuleConfig>,
        clean_messages_to_trust: u32,
    ) -> ModerationPipeline<MockProbationStore> {
        let classifier = Classifier::new(
            RuleSet::compile(&rules).unwrap(),
            ScoreThresholds {
                suspicious: 5.0,
                spam: 10.0,
            },
        )
        .unwrap();
        let registry = ProbationRegistry::new(
            MockProbationStore::default(),
            ProbationConfig {
                clean_messages_to_trust,
                window_secs: 24 * 60 * 60,
            },
        );
        ModerationPipeline::new(classifier, Arc::new(registry))
    }

    fn link_rule() -> RuleConfig {
        RuleConfig::keywords("links", 10.0, true, &["http://"])
    }

    #[test]
    fn test_link_from_new_member_is_suppressed() {
        let pipeline = pipeline(vec![link_rule()], 3);
        pipeline.handle_join(1, t0());

        let action = pipeline.handle_message(1, "visit http://spam.example", t0());

        assert_eq!(action.kind, ActionKind::Suppress);
        assert_eq!(action.reason.member_state, MemberState::New);
        assert_eq!(action.reason.matched_rules, vec!["links".to_string()]);
        assert_eq!(action.reason.score, 10.0);
        assert_eq!(pipeline.registry().member(1).unwrap().clean_message_count, 0);
    }

    #[test]
    fn test_link_from_untracked_member_is_allowed() {
        let pipeline = pipeline(vec![link_rule()], 3);

        let action = pipeline.handle_message(2, "visit http://spam.example", t0());

        assert_eq!(action.kind, ActionKind::Allow);
        assert_eq!(action.reason.member_state, MemberState::Trusted);
        assert_eq!(action.reason.score, 0.0);
        assert!(pipeline.registry().member(2).is_none());
    }

    #[test]
    fn test_suspicious_message_is_flagged_and_not_counted() {
        let pipeline = pipeline(
            vec![RuleConfig::keywords("earn", 6.0, false, &["earn"])],
            3,
        );
        pipeline.handle_join(1, t0());

        let action = pipeline.handle_message(1, "earn fast", t0());

        assert_eq!(action.kind, ActionKind::FlagForAdmin);
        assert_eq!(pipeline.registry().get_state(1), MemberState::New);
        assert_eq!(pipeline.registry().member(1).unwrap().clean_message_count, 0);
    }

    #[test]
    fn test_member_graduates_after_clean_messages() {
        let pipeline = pipeline(vec![link_rule()], 3);
        pipeline.handle_join(1, t0());

        for text in ["hi all", "how is everyone", "nice to be here"] {
            assert_eq!(pipeline.handle_message(1, text, t0()).kind, ActionKind::Allow);
        }
        assert_eq!(pipeline.registry().get_state(1), MemberState::Trusted);

        let action = pipeline.handle_message(1, "see http://docs.example", t0());
        assert_eq!(action.kind, ActionKind::Allow);
        assert!(action.reason.matched_rules.is_empty());
        assert_eq!(action.reason.member_state, MemberState::Trusted);
    }

    #[test]
    fn test_allowed_messages_increment_count_exactly() {
        let pipeline = pipeline(vec![link_rule()], 100);
        pipeline.handle_join(1, t0());

        let mut allowed = 0;
        for i in 0..20 {
            let text = if i % 3 == 0 { "http://x.example" } else { "hello" };
            if pipeline.handle_message(1, text, t0()).kind == ActionKind::Allow {
                allowed += 1;
            }
        }

        assert_eq!(
            pipeline.registry().member(1).unwrap().clean_message_count,
            allowed
        );
    }

    #[test]
    fn test_window_elapsed_before_message_disables_probation_rules() {
        let pipeline = pipeline(vec![link_rule()], 100);
        pipeline.handle_join(1, t0());

        let action = pipeline.handle_message(1, "http://x.example", t0() + Duration::days(2));

        assert_eq!(action.kind, ActionKind::Allow);
        assert_eq!(action.reason.member_state, MemberState::Trusted);
    }

    #[test]
    fn test_duplicate_joins_do_not_reset_progress() {
        let pipeline = pipeline(vec![link_rule()], 3);
        pipeline.handle_join(1, t0());
        pipeline.handle_message(1, "hello", t0());

        pipeline.handle_join(1, t0() + Duration::minutes(1));
        pipeline.handle_join(1, t0() + Duration::minutes(2));

        let member = pipeline.registry().member(1).unwrap();
        assert_eq!(member.clean_message_count, 1);
        assert_eq!(member.state, MemberState::Probation);
        assert_eq!(member.joined_at, t0());
    }

    #[test]
    fn test_empty_message_is_allowed_and_counted() {
        let pipeline = pipeline(vec![link_rule()], 3);
        pipeline.handle_join(1, t0());

        let action = pipeline.handle_message(1, "   ", t0());

        assert_eq!(action.kind, ActionKind::Allow);
        assert_eq!(pipeline.registry().member(1).unwrap().clean_message_count, 1);
    }
}
