use anyhow::Result;
use serenity::{async_trait, http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::debug;

use crate::ui::notifications::Notifier;

/// Envía los avisos del motor como mensajes de texto
pub struct ChannelNotifier {
    http: Arc<Http>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, channel: ChannelId, content: String) -> Result<()> {
        debug!("💬 {} → {}", channel, content);
        channel.say(&self.http, content).await?;
        Ok(())
    }
}
