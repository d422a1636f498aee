use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::Recipient;
use tracing::{debug, warn};

use common::{Error, Notifier, Result};

/// Sends plain-text alerts through the Telegram Bot API.
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }
}

/// Turn a configured destination into a Telegram recipient.
///
/// Integers (including negative group/channel ids) are chat ids; anything
/// else is treated as a public channel username such as `@my_alerts`.
pub fn parse_recipient(destination: &str) -> Result<Recipient> {
    let destination = destination.trim();
    if destination.is_empty() {
        return Err(Error::Notify("destination is empty".into()));
    }
    Ok(match destination.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if destination.starts_with('@') => {
            Recipient::ChannelUsername(destination.to_string())
        }
        Err(_) => Recipient::ChannelUsername(format!("@{destination}")),
    })
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, destination: &str, text: &str) -> Result<()> {
        let recipient = parse_recipient(destination)?;
        debug!(destination, "Sending Telegram message");
        self.bot
            .send_message(recipient, text)
            .await
            .map_err(|e| {
                warn!(destination, error = %e, "Failed to send Telegram message");
                Error::Notify(e.to_string())
            })?;
        Ok(())
    }
}
