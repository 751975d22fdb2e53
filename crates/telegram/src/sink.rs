use async_trait::async_trait;
use teloxide::prelude::*;

use common::{Market, Signal, SignalSink};

use crate::commands::send_alert;
use crate::format::format_signal;

/// Sends a formatted notification to every allowed chat for each signal.
pub struct TelegramSink {
    bot: Bot,
    chat_ids: Vec<ChatId>,
    market: Market,
}

impl TelegramSink {
    pub fn new(bot: Bot, user_ids: &[i64], market: Market) -> Self {
        Self {
            bot,
            chat_ids: user_ids.iter().map(|&id| ChatId(id)).collect(),
            market,
        }
    }
}

#[async_trait]
impl SignalSink for TelegramSink {
    async fn deliver(&self, signal: Signal) {
        let text = format_signal(&self.market, &signal);
        send_alert(&self.bot, &self.chat_ids, &text).await;
    }
}
