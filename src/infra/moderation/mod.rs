// Implementations for the moderation system.

pub mod config_file;
pub mod json_probation_store;
pub mod sqlite_probation_store;

pub use config_file::load_moderation_config;
pub use json_probation_store::JsonProbationStore;
pub use sqlite_probation_store::SqliteProbationStore;
