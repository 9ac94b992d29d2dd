use anyhow::{Context, Result};
use config::{builder::DefaultState, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo
    pub activity_name: String,
    pub activity_type: String,

    // Fallback
    pub max_attempts: usize,
    pub fallback_candidates: usize,
    pub fallback_delay_ms: u64,
    pub block_cooldown_secs: u64,

    // Sesión de voz
    pub leave_on_empty: bool,
    pub leave_on_empty_cooldown_ms: u64,
    pub leave_on_end: bool,
    pub leave_on_end_cooldown_ms: u64,
    pub connection_timeout_secs: u64,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub ytdlp_path: String,
}

impl Config {
    /// Defaults, then `config.{toml,json}` if present, then the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let builder = Self::defaults()?
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::default().try_parsing(true));

        let config = Self::from_builder(builder)?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let d = Self::default();
        let builder = config::Config::builder()
            .set_default("discord_token", d.discord_token)?
            .set_default("application_id", d.application_id)?
            .set_default("activity_name", d.activity_name)?
            .set_default("activity_type", d.activity_type)?
            .set_default("max_attempts", d.max_attempts as u64)?
            .set_default("fallback_candidates", d.fallback_candidates as u64)?
            .set_default("fallback_delay_ms", d.fallback_delay_ms)?
            .set_default("block_cooldown_secs", d.block_cooldown_secs)?
            .set_default("leave_on_empty", d.leave_on_empty)?
            .set_default("leave_on_empty_cooldown_ms", d.leave_on_empty_cooldown_ms)?
            .set_default("leave_on_end", d.leave_on_end)?
            .set_default("leave_on_end_cooldown_ms", d.leave_on_end_cooldown_ms)?
            .set_default("connection_timeout_secs", d.connection_timeout_secs)?
            .set_default("default_volume", d.default_volume as f64)?
            .set_default("max_queue_size", d.max_queue_size as u64)?
            .set_default("ytdlp_path", d.ytdlp_path)?;
        Ok(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("No se pudo leer la configuración")?
            .try_deserialize()
            .context("Configuración inválida")
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token and application id must be present
    /// - Volume must be between 0.0 and 2.0
    /// - The attempt cap and candidate count must be > 0
    /// - Max queue size must be > 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN is required");
        }

        if self.application_id == 0 {
            anyhow::bail!("APPLICATION_ID is required");
        }

        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_attempts == 0 {
            anyhow::bail!("Max attempts must be greater than 0");
        }

        if self.fallback_candidates == 0 {
            anyhow::bail!("Fallback candidates must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Fallback: {} attempts, {} candidates, {}ms delay, {}s block cooldown\n  \
            Voice: leave on empty={} ({}ms), leave on end={} ({}ms)\n  \
            Audio: {}% vol, {} max queue, yt-dlp at '{}'",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.max_attempts,
            self.fallback_candidates,
            self.fallback_delay_ms,
            self.block_cooldown_secs,
            self.leave_on_empty,
            self.leave_on_empty_cooldown_ms,
            self.leave_on_end,
            self.leave_on_end_cooldown_ms,
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.ytdlp_path
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when neither the file nor the environment provide a key.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,
            activity_name: "/play".to_string(),
            activity_type: "listening".to_string(),

            // Fallback defaults
            max_attempts: 5,
            fallback_candidates: 3,
            fallback_delay_ms: 1000,
            block_cooldown_secs: 600,

            // Voice defaults
            leave_on_empty: true,
            leave_on_empty_cooldown_ms: 1000,
            leave_on_end: true,
            leave_on_end_cooldown_ms: 30_000,
            connection_timeout_secs: 20,

            // Audio defaults
            default_volume: 0.5,
            max_queue_size: 1000,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
