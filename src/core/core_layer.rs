// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "admins/admin_list.rs"]
pub mod admins;

#[path = "moderation/mod.rs"]
pub mod moderation;
