// This is the entry point of the moderation bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic): classifier, probation, pipeline
// - `infra/` = Implementations of core traits (probation stores, config file)
// - `discord/` = Discord-specific adapters (commands, events, action delivery)
//
// This file's job is to:
// 1. Load configuration (and refuse to start on a bad moderation policy)
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Flush probation state periodically and on shutdown

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::admins::AdminAllowList;
use crate::core::moderation::{ModerationPipeline, ModerationPolicy, ProbationRegistry};
use crate::discord::moderation::moderation_events;
use crate::discord::{Data, Error, ProbationBackend};
use crate::infra::moderation::{load_moderation_config, JsonProbationStore, SqliteProbationStore};
use poise::serenity_prelude as serenity;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

const DEFAULT_FLUSH_SECS: u64 = 30;

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            moderation_events::handle_message(ctx, new_message, data).await?;
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            moderation_events::handle_member_join(new_member, data);
        }
        _ => {}
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    // Keep runtime data in a dedicated folder so the repo root stays tidy.
    let data_dir = PathBuf::from("data");
    std::fs::create_dir_all(&data_dir).expect("Failed to create data directory");

    // ========================================================================
    // MODERATION POLICY
    // ========================================================================
    // A bad policy must stop the process before it serves any traffic.

    let config_path = std::env::var("MODERATION_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir.join("moderation.json"));
    let ModerationPolicy { config, classifier } = match load_moderation_config(&config_path).await
    {
        Ok(policy) => policy,
        Err(e) => {
            tracing::error!("Invalid moderation config: {}", e);
            std::process::exit(1);
        }
    };
    let thresholds = classifier.thresholds();
    tracing::info!(
        rules = classifier.rule_count(),
        suspicious = thresholds.suspicious,
        spam = thresholds.spam,
        clean_messages_to_trust = config.probation.clean_messages_to_trust,
        window_secs = config.probation.window_secs,
        "Moderation policy loaded"
    );

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let store: ProbationBackend = match std::env::var("PROBATION_STORE").as_deref() {
        Ok("sqlite") => {
            let db_path = data_dir.join("probation.db");
            Box::new(
                SqliteProbationStore::new(&db_path.to_string_lossy())
                    .await
                    .expect("Failed to initialize SQLite probation store"),
            )
        }
        _ => Box::new(JsonProbationStore::new(data_dir.join("probation.json"))),
    };

    let registry = Arc::new(ProbationRegistry::open(store, config.probation).await);
    tracing::info!(members = registry.len(), "Probation registry ready");
    let pipeline = Arc::new(ModerationPipeline::new(classifier, Arc::clone(&registry)));

    let admins = Arc::new(AdminAllowList::from_csv(
        &std::env::var("ADMIN_IDS").unwrap_or_default(),
    ));
    if admins.snapshot().ids.is_empty() {
        tracing::warn!("ADMIN_IDS is empty - nobody will receive moderation alerts");
    }

    let target_guild = std::env::var("TARGET_GUILD_ID")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok());
    let flush_secs = std::env::var("PROBATION_FLUSH_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_FLUSH_SECS)
        .max(1);

    let data = Data {
        pipeline: Arc::clone(&pipeline),
        admins: Arc::clone(&admins),
        target_guild,
    };

    // Background flush. Failures are logged by the registry and retried next tick.
    let flush_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(flush_secs));
        loop {
            interval.tick().await;
            if flush_registry.is_dirty() {
                let _ = flush_registry.persist().await;
            }
        }
    });

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS; // Required for join events

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::moderation::commands::moderators(),
                discord::moderation::commands::probation(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                moderation_events::notify_admins(&ctx.http, &data.admins, "🟢 Bot started")
                    .await;

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    let shard_manager = Arc::clone(&client.shard_manager);
    let http = Arc::clone(&client.http);

    tokio::select! {
        result = client.start() => {
            if let Err(e) = result {
                tracing::error!("Client stopped with an error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
    }

    // ========================================================================
    // SHUTDOWN
    // ========================================================================

    moderation_events::notify_admins(&http, &admins, "🔴 Bot stopped").await;
    shard_manager.shutdown_all().await;

    match registry.persist().await {
        Ok(count) => tracing::info!(members = count, "Probation registry saved"),
        Err(e) => tracing::error!("Probation registry could not be saved on shutdown: {}", e),
    }
}
