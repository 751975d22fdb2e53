pub mod commands;
pub mod format;
pub mod sink;

pub use commands::{start_bot, BotDeps};
pub use format::{format_rules, format_signal};
pub use sink::TelegramSink;
