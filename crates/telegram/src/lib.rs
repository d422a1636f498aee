pub mod notifier;

pub use notifier::{parse_recipient, TelegramNotifier};
