// Discord adapters for moderation: event handling, action delivery, commands.

pub mod commands;
pub mod moderation_events;
pub mod report_formatter;
