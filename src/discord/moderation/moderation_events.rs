// Discord-specific moderation glue - feeds events into the pipeline and
// carries out the resulting actions.

use crate::core::admins::AdminAllowList;
use crate::core::moderation::{Action, ActionKind};
use crate::discord::moderation::report_formatter::{format_admin_report, ReportContext};
use crate::discord::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;

/// Run a guild message through the moderation pipeline and apply the decision.
pub async fn handle_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    // Skip bots
    if msg.author.bot {
        return Ok(());
    }

    // Only moderate guild messages
    let guild_id = match msg.guild_id {
        Some(id) => id.get(),
        None => return Ok(()),
    };
    if !data.moderates(guild_id) {
        return Ok(());
    }

    let action = data
        .pipeline
        .handle_message(msg.author.id.get(), &msg.content, Utc::now());

    apply_action(ctx, msg, &data.admins, &action).await;
    Ok(())
}

/// Enroll a new member in probation.
pub fn handle_member_join(member: &serenity::Member, data: &Data) {
    if member.user.bot || !data.moderates(member.guild_id.get()) {
        return;
    }

    data.pipeline.handle_join(member.user.id.get(), Utc::now());
}

/// Carry out an action. Failures are logged; message flow never stops here.
async fn apply_action(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    admins: &AdminAllowList,
    action: &Action,
) {
    if action.kind == ActionKind::Allow {
        return;
    }

    if action.kind == ActionKind::Suppress {
        if let Err(e) = msg.delete(&ctx.http).await {
            tracing::warn!("Failed to delete spam message: {}", e);
        }
    }

    let link = msg.link();
    let report = format_admin_report(
        action.kind,
        &action.reason,
        &ReportContext {
            author_id: msg.author.id.get(),
            message_link: &link,
            content: &msg.content,
        },
    );

    if let Some(report) = report {
        notify_admins(&ctx.http, admins, &report).await;
    }
}

/// DM every admin on the allow-list.
pub async fn notify_admins(http: &serenity::Http, admins: &AdminAllowList, text: &str) {
    let snapshot = admins.snapshot();

    for admin_id in snapshot.ids {
        let user = serenity::UserId::new(admin_id);
        match user.create_dm_channel(http).await {
            Ok(channel) => {
                if let Err(e) = channel.say(http, text).await {
                    tracing::warn!(admin_id, "Failed to DM admin: {}", e);
                }
            }
            Err(e) => tracing::warn!(admin_id, "Failed to open DM with admin: {}", e),
        }
    }
}
