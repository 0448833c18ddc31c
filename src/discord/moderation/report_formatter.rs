// Turns moderation actions into the text admins receive by DM.
//
// Kept free of serenity types so the wording can be tested directly.

use crate::core::moderation::{ActionKind, ActionReason};

/// How much of the offending message to quote in a report.
const MAX_QUOTE_CHARS: usize = 500;

/// Everything a report needs to know about the offending message.
pub struct ReportContext<'a> {
    pub author_id: u64,
    pub message_link: &'a str,
    pub content: &'a str,
}

/// Build the admin DM for an action. `None` for actions admins don't hear about.
pub fn format_admin_report(
    kind: ActionKind,
    reason: &ActionReason,
    message: &ReportContext<'_>,
) -> Option<String> {
    let headline = match kind {
        ActionKind::Allow => return None,
        ActionKind::FlagForAdmin => format!(
            "⚠️ **Suspicious message** from <@{}>: {}",
            message.author_id, message.message_link
        ),
        ActionKind::Suppress => format!(
            "🚫 **Deleted spam** from <@{}> (was {})",
            message.author_id, message.message_link
        ),
    };

    let rules = if reason.matched_rules.is_empty() {
        "none".to_string()
    } else {
        reason.matched_rules.join(", ")
    };

    Some(format!(
        "{}\nMember state: {} • Score: {} • Rules: {}\n{}",
        headline,
        reason.member_state,
        reason.score,
        rules,
        quote(message.content)
    ))
}

/// Quote message content as a Markdown block, truncated on a char boundary.
fn quote(content: &str) -> String {
    let mut text: String = content.chars().take(MAX_QUOTE_CHARS).collect();
    if content.chars().count() > MAX_QUOTE_CHARS {
        text.push('…');
    }
    text.lines()
        .map(|line| format!("> {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::MemberState;

    fn reason(rules: &[&str]) -> ActionReason {
        ActionReason {
            matched_rules: rules.iter().map(|r| r.to_string()).collect(),
            member_state: MemberState::New,
            score: 12.0,
        }
    }

    fn context(content: &str) -> ReportContext<'_> {
        ReportContext {
            author_id: 42,
            message_link: "https://discord.com/channels/1/2/3",
            content,
        }
    }

    #[test]
    fn test_allow_produces_no_report() {
        assert!(format_admin_report(ActionKind::Allow, &reason(&[]), &context("hi")).is_none());
    }

    #[test]
    fn test_suppress_report_lists_rules_and_state() {
        let report = format_admin_report(
            ActionKind::Suppress,
            &reason(&["links", "easy_money"]),
            &context("earn now\nhttp://x.example"),
        )
        .unwrap();

        assert!(report.starts_with("🚫 **Deleted spam** from <@42>"));
        assert!(report.contains("Member state: New"));
        assert!(report.contains("Score: 12"));
        assert!(report.contains("Rules: links, easy_money"));
        assert!(report.ends_with("> earn now\n> http://x.example"));
    }

    #[test]
    fn test_flag_report_links_message() {
        let report =
            format_admin_report(ActionKind::FlagForAdmin, &reason(&["dm"]), &context("dm me"))
                .unwrap();

        assert!(report.contains("Suspicious message"));
        assert!(report.contains("https://discord.com/channels/1/2/3"));
    }

    #[test]
    fn test_long_content_is_truncated() {
        let content = "я".repeat(MAX_QUOTE_CHARS + 50);

        let quoted = quote(&content);

        assert_eq!(quoted.chars().count(), 2 + MAX_QUOTE_CHARS + 1);
        assert!(quoted.ends_with('…'));
    }
}
