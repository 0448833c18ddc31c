// Core moderation module - probation tracking and rule-based classification.
// Models, the probation storage port, and services with no Discord
// dependencies.

pub mod classifier;
pub mod moderation_config;
pub mod moderation_models;
pub mod moderation_pipeline;
pub mod probation_registry;
pub mod rules;

pub use classifier::*;
pub use moderation_config::*;
pub use moderation_models::*;
pub use moderation_pipeline::*;
pub use probation_registry::*;
