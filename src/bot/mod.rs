//! # Bot Module
//!
//! Discord gateway glue for Encore.
//!
//! This module contains:
//! - Command registration (per guild, or one development guild)
//! - Interaction dispatch to the command handlers
//! - Voice state tracking (external disconnects, empty channels)
//!
//! ## Architecture
//!
//! [`EncoreBot`] implements Serenity's [`EventHandler`] and owns nothing but
//! shared handles: every command is a thin caller over the one
//! [`PlaybackEngine`], and the [`AudioPlayer`] is the engine's voice backend.

use serenity::{
    all::{ActivityData, Context, EventHandler, Guild, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{engine::PlaybackEngine, player::AudioPlayer},
    config::Config,
    sources::lyrics::LyricsClient,
};

/// Main Discord bot handler.
pub struct EncoreBot {
    pub config: Arc<Config>,
    pub engine: Arc<PlaybackEngine>,
    pub player: Arc<AudioPlayer>,
    pub lyrics: LyricsClient,
}

impl EncoreBot {
    pub fn new(
        config: Arc<Config>,
        engine: Arc<PlaybackEngine>,
        player: Arc<AudioPlayer>,
        lyrics: LyricsClient,
    ) -> Self {
        Self {
            config,
            engine,
            player,
            lyrics,
        }
    }

    async fn register_commands(&self, ctx: &Context, guild_id: GuildId) {
        match commands::register_guild_commands(ctx, guild_id).await {
            Ok(()) => info!("✅ Comandos registrados en guild {}", guild_id),
            Err(e) => error!(
                "❌ Error registrando comandos en guild {}: {:?}. Verifica el permiso 'applications.commands'.",
                guild_id, e
            ),
        }
    }

    fn activity(&self) -> ActivityData {
        let name = self.config.activity_name.clone();
        match self.config.activity_type.to_lowercase().as_str() {
            "playing" => ActivityData::playing(name),
            "watching" => ActivityData::watching(name),
            "competing" => ActivityData::competing(name),
            _ => ActivityData::listening(name),
        }
    }

    /// Usuarios (no bots) en el canal de voz del bot
    fn listeners(ctx: &Context, guild_id: GuildId, channel_id: serenity::all::ChannelId) -> usize {
        let Some(guild) = ctx.cache.guild(guild_id) else {
            return 0;
        };
        guild
            .voice_states
            .values()
            .filter(|vs| vs.channel_id == Some(channel_id))
            .filter(|vs| !vs.member.as_ref().is_some_and(|m| m.user.bot))
            .count()
    }
}

#[async_trait]
impl EventHandler for EncoreBot {
    /// Registra comandos y fija la actividad del bot.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos solo en la guild de desarrollo {}", guild_id);
                self.register_commands(&ctx, GuildId::new(guild_id)).await;
            }
            None => {
                for guild in &ready.guilds {
                    self.register_commands(&ctx, guild.id).await;
                }
            }
        }

        ctx.set_activity(Some(self.activity()));
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        if is_new == Some(true) && self.config.guild_id.is_none() {
            info!("🆕 Nueva guild: {} ({})", guild.name, guild.id);
            self.register_commands(&ctx, guild.id).await;
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            let name = command.data.name.clone();
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando /{}: {:?}", name, e);
            }
        }
    }

    /// Detecta desconexiones externas y canales vacíos.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        let bot_id = ctx.cache.current_user().id;
        let bot_channel = self.player.current_channel(guild_id).await;

        if new.user_id == bot_id {
            if old.is_some() && new.channel_id.is_none() && bot_channel.is_none() {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.engine.forget(guild_id);
                self.player.forget(guild_id);
            }
            return;
        }

        let Some(channel_id) = bot_channel else {
            return;
        };

        let touched = new.channel_id == Some(channel_id)
            || old.as_ref().and_then(|o| o.channel_id) == Some(channel_id);
        if !touched {
            return;
        }

        let listeners = Self::listeners(&ctx, guild_id, channel_id);
        debug!("👥 {} oyentes en el canal de voz de guild {}", listeners, guild_id);
        if listeners == 0 {
            self.player.channel_emptied(guild_id);
        } else {
            self.player.channel_occupied(guild_id);
        }
    }
}
