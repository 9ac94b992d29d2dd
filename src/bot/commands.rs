use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        attachment_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        remove_command(),
        loop_command(),
        nowplaying_command(),
        lyrics_command(),
    ]
}

/// Registra los comandos en una guild
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Plays a song from YouTube")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "The song you want to play",
            )
            .required(true),
        )
}

fn attachment_command() -> CreateCommand {
    CreateCommand::new("attachment")
        .description("Plays an audio file attachment")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Attachment,
                "file",
                "The audio file (MP3, OGG, WAV, FLAC, M4A)",
            )
            .required(true),
        )
}

// Comandos de control

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skips the current song")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stops the player")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Shows the current music queue")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Removes a track from the queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "track",
                "The track number to remove",
            )
            .min_int_value(1)
            .required(true),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Set loop mode for the queue")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "The loop mode (off, track, queue)")
                .add_string_choice("Off", "off")
                .add_string_choice("Track", "track")
                .add_string_choice("Queue", "queue")
                .required(true),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Shows the currently playing song")
}

// Comandos adicionales

fn lyrics_command() -> CreateCommand {
    CreateCommand::new("lyrics")
        .description("Get lyrics for a song")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "song",
                "The name of the song to search lyrics for",
            )
            .required(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_command_is_registered() {
        assert_eq!(all_commands().len(), 9);
    }
}
