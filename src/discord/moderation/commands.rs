// Moderation slash commands - admin allow-list and probation lookups.

use crate::core::moderation::MemberState;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Only users on the admin allow-list may run these commands.
async fn is_admin(ctx: Context<'_>) -> Result<bool, Error> {
    let allowed = ctx.data().admins.contains(ctx.author().id.get());
    if !allowed {
        ctx.send(
            poise::CreateReply::default()
                .content("⛔ Only bot admins can use this command.")
                .ephemeral(true),
        )
        .await?;
    }
    Ok(allowed)
}

/// Manage who receives moderation alerts.
#[poise::command(
    slash_command,
    subcommands("add", "remove", "list"),
    check = "is_admin"
)]
pub async fn moderators(_ctx: Context<'_>) -> Result<(), Error> {
    // Parent command - shows help
    Ok(())
}

/// Add a user to the admin list.
#[poise::command(slash_command, check = "is_admin")]
pub async fn add(
    ctx: Context<'_>,
    #[description = "User who should receive moderation alerts"] user: serenity::User,
) -> Result<(), Error> {
    match ctx.data().admins.add(user.id.get()) {
        Ok(_) => {
            ctx.say(format!("✅ <@{}> is now a bot admin.", user.id))
                .await?;
        }
        Err(e) => {
            ctx.say(format!("❌ {}", e)).await?;
        }
    }
    Ok(())
}

/// Remove a user from the admin list.
#[poise::command(slash_command, check = "is_admin")]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "User to remove"] user: serenity::User,
) -> Result<(), Error> {
    match ctx.data().admins.remove(user.id.get()) {
        Ok(_) => {
            ctx.say(format!("✅ <@{}> is no longer a bot admin.", user.id))
                .await?;
        }
        Err(e) => {
            ctx.say(format!("❌ {}", e)).await?;
        }
    }
    Ok(())
}

/// Show the current admin list.
#[poise::command(slash_command, check = "is_admin")]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let snapshot = ctx.data().admins.snapshot();
    let mentions: Vec<String> = snapshot.ids.iter().map(|id| format!("<@{}>", id)).collect();

    ctx.say(format!(
        "🛡️ Bot admins (v{}): {}",
        snapshot.version,
        mentions.join(", ")
    ))
    .await?;
    Ok(())
}

/// Inspect members on probation.
#[poise::command(slash_command, subcommands("status"), check = "is_admin")]
pub async fn probation(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show a member's probation state.
#[poise::command(slash_command, check = "is_admin")]
pub async fn status(
    ctx: Context<'_>,
    #[description = "Member to look up"] user: serenity::User,
) -> Result<(), Error> {
    let registry = ctx.data().pipeline.registry();

    let Some(member) = registry.member(user.id.get()) else {
        ctx.say(format!(
            "<@{}> is not tracked and is treated as trusted.",
            user.id
        ))
        .await?;
        return Ok(());
    };

    let config = registry.config();
    let remaining = config
        .clean_messages_to_trust
        .saturating_sub(member.clean_message_count);
    let window_ends = member
        .joined_at
        .checked_add_signed(config.window())
        .map(|t| format!("<t:{}:f>", t.timestamp()))
        .unwrap_or_else(|| "never".to_string());

    let embed = serenity::CreateEmbed::new()
        .title(format!("🕵️ Probation: {}", user.name))
        .color(match member.state {
            MemberState::Trusted => 0x00FF00,
            _ => 0xFFA500,
        })
        .field("State", member.state.to_string(), true)
        .field(
            "Clean messages",
            format!("{} ({} to go)", member.clean_message_count, remaining),
            true,
        )
        .field("Joined", format!("<t:{}:R>", member.joined_at.timestamp()), true)
        .field("Window ends", window_ends, true);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
