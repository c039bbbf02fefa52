use anyhow::Result;
use std::time::Duration;

use crate::bridge::{BridgeTimeouts, CoreSettings};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // API HTTP
    pub api_host: String,
    pub api_port: u16,

    // Logging
    pub log_level: String,

    // Audio
    pub default_volume: f32,
    pub ytdl_format: String,
    pub ytdlp_path: String,

    // Tiempos
    pub ready_timeout: Duration,
    pub connect_timeout: Duration,
    pub play_timeout: Duration,
    pub auto_leave_grace: Duration,
    pub stale_sweep_interval: Option<Duration>, // None = desactivado
    pub settle_delay: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN no está definido"))?,

            // API HTTP
            api_host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,

            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.25".to_string())
                .parse()?,
            ytdl_format: std::env::var("YTDL_FORMAT")
                .unwrap_or_else(|_| "bestaudio/best".to_string()),
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),

            // Tiempos
            ready_timeout: secs("READY_TIMEOUT_SECS", 30)?,
            connect_timeout: secs("CONNECT_TIMEOUT_SECS", 30)?,
            play_timeout: secs("PLAY_TIMEOUT_SECS", 60)?,
            auto_leave_grace: secs("AUTO_LEAVE_GRACE_SECS", 5)?,
            stale_sweep_interval: Some(secs("STALE_SWEEP_INTERVAL_SECS", 60)?)
                .filter(|interval| !interval.is_zero()),
            settle_delay: Duration::from_millis(
                std::env::var("SETTLE_DELAY_MS")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()?,
            ),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The token must not be empty
    /// - Volume must be between 0.0 and 1.0
    /// - Bridge timeouts and the API port must be non-zero
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 1.0, got: {}", self.default_volume);
        }

        if self.api_port == 0 {
            anyhow::bail!("API port must be greater than 0");
        }

        for (name, value) in [
            ("Ready timeout", self.ready_timeout),
            ("Connect timeout", self.connect_timeout),
            ("Play timeout", self.play_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            API: {}:{}\n  \
            Audio: {}% vol, formato '{}', yt-dlp '{}'\n  \
            Bridge: ready {}, connect {}, play {}\n  \
            Voice: auto-leave {}, sweep {}, settle {}",
            self.api_host,
            self.api_port,
            (self.default_volume * 100.0) as u32,
            self.ytdl_format,
            self.ytdlp_path,
            humantime::format_duration(self.ready_timeout),
            humantime::format_duration(self.connect_timeout),
            humantime::format_duration(self.play_timeout),
            humantime::format_duration(self.auto_leave_grace),
            self.stale_sweep_interval
                .map_or("off".to_string(), |i| humantime::format_duration(i).to_string()),
            humantime::format_duration(self.settle_delay),
        )
    }

    pub fn bridge_timeouts(&self) -> BridgeTimeouts {
        BridgeTimeouts {
            ready: self.ready_timeout,
            connect: self.connect_timeout,
            play: self.play_timeout,
        }
    }

    pub fn core_settings(&self) -> CoreSettings {
        CoreSettings {
            settle_delay: self.settle_delay,
            default_volume: self.default_volume,
        }
    }
}

fn secs(var: &str, default: u64) -> Result<Duration> {
    let value = match std::env::var(var) {
        Ok(val) if !val.trim().is_empty() => val.trim().parse()?,
        _ => default,
    };
    Ok(Duration::from_secs(value))
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin default, debe proveerse)
            discord_token: String::new(),

            api_host: "0.0.0.0".to_string(),
            api_port: 8080,
            log_level: "info".to_string(),

            default_volume: 0.25,
            ytdl_format: "bestaudio/best".to_string(),
            ytdlp_path: "yt-dlp".to_string(),

            ready_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            play_timeout: Duration::from_secs(60),
            auto_leave_grace: Duration::from_secs(5),
            stale_sweep_interval: Some(Duration::from_secs(60)),
            settle_delay: Duration::from_millis(100),
        }
    }
}
