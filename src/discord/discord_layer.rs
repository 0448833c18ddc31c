// Discord layer - commands and event handlers.

#[path = "moderation/mod.rs"]
pub mod moderation;

use crate::core::admins::AdminAllowList;
use crate::core::moderation::{ModerationPipeline, ProbationStore};
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Probation backend picked at startup (JSON file or SQLite).
pub type ProbationBackend = Box<dyn ProbationStore>;

/// Shared state handed to every command and event handler.
pub struct Data {
    pub pipeline: Arc<ModerationPipeline<ProbationBackend>>,
    /// Owned here, not by the moderation core
    pub admins: Arc<AdminAllowList>,
    /// When set, only this guild is moderated
    pub target_guild: Option<u64>,
}

impl Data {
    pub fn moderates(&self, guild_id: u64) -> bool {
        self.target_guild.map_or(true, |target| target == guild_id)
    }
}
