use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage,
    },
    model::{
        application::{CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        engine::{NodeOptions, PlayRequest, VoiceBackend},
        events::QueueMetadata,
        queue::LoopMode,
    },
    bot::EncoreBot,
    error::AttachmentError,
    sources::{attachment::AttachmentInfo, ExternalService, ProviderTag, Resolution},
    ui::{embeds, notifications},
};

const NOTHING_PLAYING: &str = "❌ | No music is being played!";

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &EncoreBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "attachment" => handle_attachment(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "lyrics" => handle_lyrics(ctx, &command, bot).await?,
        _ => reply(ctx, &command, "❌ | Unknown command", true).await?,
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &EncoreBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    let voice_channel = match voice_guard(ctx, bot, guild_id, command.user.id).await {
        Ok(channel) => channel,
        Err(message) => return reply(ctx, command, message, true).await,
    };

    // Defer la respuesta ya que puede tomar tiempo
    defer(ctx, command).await?;

    if let Some(service) = ExternalService::detect(&query) {
        follow_up(
            ctx,
            command,
            format!(
                "🔍 | Detected {} link, extracting song information...",
                service.display_name()
            ),
        )
        .await?;
    }

    let resolution = bot.engine.resolver().resolve(&query, command.user.id).await;
    if resolution.is_empty() {
        return follow_up(ctx, command, notifications::NO_RESULTS.to_string()).await;
    }

    follow_up(ctx, command, progress_message(&query, &resolution)).await?;

    let request = play_request(ctx, bot, guild_id, voice_channel, command.channel_id, command.user.id);
    let outcome = bot.engine.start_episode(request, resolution).await;
    debug!("🎯 /play en guild {} terminó: {:?}", guild_id, outcome);

    Ok(())
}

async fn handle_attachment(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &EncoreBot,
    guild_id: GuildId,
) -> Result<()> {
    defer(ctx, command).await?;

    let Some(attachment) = attachment_option(command, "file") else {
        return follow_up(
            ctx,
            command,
            "❌ | You need to provide an audio file attachment!".to_string(),
        )
        .await;
    };

    if attachment.validate().is_err() {
        return follow_up(ctx, command, notifications::UNSUPPORTED_ATTACHMENT.to_string()).await;
    }

    let voice_channel = match voice_guard(ctx, bot, guild_id, command.user.id).await {
        Ok(channel) => channel,
        Err(message) => return follow_up(ctx, command, format!("❌ | {}", message)).await,
    };

    follow_up(
        ctx,
        command,
        format!("🔍 | Processing attachment: **{}**...", attachment.name),
    )
    .await?;

    let candidate = match bot
        .engine
        .resolver()
        .resolve_attachment(&attachment, command.user.id)
        .await
    {
        Ok(candidate) => candidate,
        Err(AttachmentError::UnsupportedType(_)) => {
            return follow_up(ctx, command, notifications::UNSUPPORTED_ATTACHMENT.to_string()).await
        }
        Err(AttachmentError::Unreadable { name, twitter }) => {
            warn!("⚠️ Adjunto ilegible: {}", name);
            return follow_up(ctx, command, notifications::unreadable_attachment(twitter).to_string())
                .await;
        }
    };

    let request = play_request(ctx, bot, guild_id, voice_channel, command.channel_id, command.user.id);
    let outcome = bot.engine.start_single(request, candidate).await;
    debug!("📎 /attachment en guild {} terminó: {:?}", guild_id, outcome);

    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &EncoreBot,
    guild_id: GuildId,
) -> Result<()> {
    let content = match bot.player.skip(guild_id) {
        Some(track) => format!("✅ | Skipped **{}**!", track.title()),
        None => NOTHING_PLAYING.to_string(),
    };
    reply(ctx, command, &content, false).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &EncoreBot,
    guild_id: GuildId,
) -> Result<()> {
    // Un episodio puede estar vivo mientras el bot aún se conecta
    let active = bot.engine.sessions().has_episode(guild_id)
        || bot.player.has_current(guild_id)
        || bot.player.is_connected(guild_id).await;
    if !active {
        return reply(ctx, command, NOTHING_PLAYING, false).await;
    }

    bot.engine.stop(guild_id).await;
    reply(ctx, command, "🛑 | Stopped the player!", false).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &EncoreBot,
    guild_id: GuildId,
) -> Result<()> {
    if !bot.player.has_current(guild_id) {
        return reply(ctx, command, NOTHING_PLAYING, true).await;
    }

    let info = bot.player.get_queue_info(guild_id);
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embeds::create_queue_embed(&info)),
            ),
        )
        .await?;

    Ok(())
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &EncoreBot,
    guild_id: GuildId,
) -> Result<()> {
    if !bot.player.has_current(guild_id) {
        return reply(ctx, command, NOTHING_PLAYING, true).await;
    }

    let position = integer_option(command, "track").unwrap_or(0);
    let removed = usize::try_from(position)
        .ok()
        .and_then(|p| p.checked_sub(1))
        .and_then(|index| bot.player.remove(guild_id, index).ok());

    match removed {
        Some(track) => {
            let content = format!("🗑️ | Removed track **{}** from the queue.", track.title());
            reply(ctx, command, &content, false).await
        }
        None => reply(ctx, command, "❌ | Invalid track number!", true).await,
    }
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &EncoreBot,
    guild_id: GuildId,
) -> Result<()> {
    if !bot.player.has_current(guild_id) {
        return reply(ctx, command, NOTHING_PLAYING, true).await;
    }

    let Some(mode) = string_option(command, "mode").and_then(|m| LoopMode::parse(&m)) else {
        return reply(ctx, command, "❌ | Invalid loop mode specified.", true).await;
    };

    bot.player.set_loop_mode(guild_id, mode);

    let message = match mode {
        LoopMode::Off => "🔁 | Loop mode is now off.",
        LoopMode::Track => "🔂 | Now looping the current track.",
        LoopMode::Queue => "🔁 | Now looping the entire queue.",
    };
    reply(ctx, command, message, false).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &EncoreBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some((track, position)) = bot.player.now_playing(guild_id).await else {
        return reply(ctx, command, NOTHING_PLAYING, true).await;
    };

    let embed = embeds::create_now_playing_embed(&track, position);
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

async fn handle_lyrics(ctx: &Context, command: &CommandInteraction, bot: &EncoreBot) -> Result<()> {
    let song = string_option(command, "song")
        .ok_or_else(|| anyhow::anyhow!("Canción no proporcionada"))?;

    defer(ctx, command).await?;

    let content = match bot.lyrics.search(&song).await {
        Ok(Some(lyrics)) if lyrics.plain_lyrics.is_some() => {
            command
                .create_followup(
                    &ctx.http,
                    CreateInteractionResponseFollowup::new().embed(embeds::create_lyrics_embed(&lyrics)),
                )
                .await?;
            return Ok(());
        }
        Ok(Some(_)) => "Lyrics data is incomplete",
        Ok(None) => "No lyrics found",
        Err(e) => {
            warn!("⚠️ Error buscando letra de '{}': {:#}", song, e);
            "An error occurred while fetching lyrics."
        }
    };

    follow_up(ctx, command, content.to_string()).await
}

/// Mensaje de progreso tras resolver la query de /play
fn progress_message(query: &str, resolution: &Resolution) -> String {
    let count = resolution.candidates.len();
    let first = resolution
        .candidates
        .first()
        .map(|c| c.title())
        .unwrap_or_default();

    if resolution.lookup_failed {
        return format!(
            "❌ | Couldn't extract track info from URL. Searching for: **{}**\nFound {} results, will try alternative tracks if the first one fails.",
            query, count
        );
    }

    match resolution.service {
        Some(service) if !resolution.redirected() => format!(
            "⏱ | Starting playback directly from {}: **{}**",
            service.display_name(),
            first
        ),
        Some(service) => format!(
            "✅ | Found \"{}\" from {}\n⏱ | Found {} YouTube matches. Playing the best match.",
            resolution.effective_query,
            service.display_name(),
            count
        ),
        None if resolution.origin == ProviderTag::DirectLink => format!(
            "⏱ | Loading track from URL: **{}**\nIf it fails, I'll try searching by title.",
            query
        ),
        None => format!(
            "⏱ | Searching for: **{}**\nFound {} results, will try alternative tracks if the first one fails.",
            query, count
        ),
    }
}

// Funciones auxiliares

/// Canal de voz del usuario, si el bot puede usarlo
async fn voice_guard(
    ctx: &Context,
    bot: &EncoreBot,
    guild_id: GuildId,
    user_id: UserId,
) -> std::result::Result<ChannelId, &'static str> {
    let user_channel =
        user_voice_channel(ctx, guild_id, user_id).ok_or("You need to be in a voice channel!")?;

    match bot.player.current_channel(guild_id).await {
        Some(bot_channel) if bot_channel != user_channel => Err("I'm already in a different voice channel!"),
        _ => Ok(user_channel),
    }
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild.voice_states.get(&user_id).and_then(|vs| vs.channel_id)
}

fn play_request(
    ctx: &Context,
    bot: &EncoreBot,
    guild_id: GuildId,
    voice_channel: ChannelId,
    text_channel: ChannelId,
    requested_by: UserId,
) -> PlayRequest {
    let voice_channel_name = guild_id
        .to_guild_cached(&ctx.cache)
        .and_then(|g| g.channels.get(&voice_channel).map(|c| c.name.clone()))
        .unwrap_or_else(|| voice_channel.to_string());

    let metadata = QueueMetadata {
        text_channel,
        voice_channel_name,
    };

    PlayRequest {
        guild_id,
        voice_channel,
        requested_by,
        node_options: NodeOptions::from_config(&bot.config, metadata),
    }
}

fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .map(str::to_string)
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn attachment_option(command: &CommandInteraction, name: &str) -> Option<AttachmentInfo> {
    let id = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| match opt.value {
            CommandDataOptionValue::Attachment(id) => Some(id),
            _ => None,
        })?;

    command
        .data
        .resolved
        .attachments
        .get(&id)
        .map(AttachmentInfo::from)
}

async fn defer(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;
    Ok(())
}

async fn reply(ctx: &Context, command: &CommandInteraction, content: &str, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn follow_up(ctx: &Context, command: &CommandInteraction, content: String) -> Result<()> {
    command
        .create_followup(&ctx.http, CreateInteractionResponseFollowup::new().content(content))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::resolution;

    #[test]
    fn test_progress_for_search_and_direct_link() {
        let search = resolution(&["a", "b", "c"], ProviderTag::WebSearch);
        assert_eq!(
            progress_message("daft punk", &search),
            "⏱ | Searching for: **daft punk**\nFound 3 results, will try alternative tracks if the first one fails."
        );

        let link = resolution(&["a"], ProviderTag::DirectLink);
        assert!(progress_message("https://youtu.be/a", &link).starts_with("⏱ | Loading track from URL"));
    }

    #[test]
    fn test_progress_for_external_services() {
        let mut redirected = resolution(&["a"], ProviderTag::ExternalService);
        redirected.service = Some(ExternalService::Spotify);
        redirected.effective_query = "Band Song".to_string();
        assert!(progress_message("https://open.spotify.com/track/x", &redirected)
            .starts_with("✅ | Found \"Band Song\" from Spotify"));

        redirected.lookup_failed = true;
        assert!(progress_message("https://open.spotify.com/track/x", &redirected)
            .starts_with("❌ | Couldn't extract track info"));

        let mut soundcloud = resolution(&["s"], ProviderTag::ExternalService);
        soundcloud.service = Some(ExternalService::SoundCloud);
        assert_eq!(
            progress_message("https://soundcloud.com/a/b", &soundcloud),
            "⏱ | Starting playback directly from SoundCloud: **S**"
        );
    }
}
