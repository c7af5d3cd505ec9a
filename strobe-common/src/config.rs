//! Bootstrap configuration (`strobe.toml`)
//!
//! Config file resolution priority:
//! 1. Explicit path (command-line argument)
//! 2. `STROBE_CONFIG` environment variable
//! 3. `<config_dir>/strobe/strobe.toml`
//!
//! A missing file is not an error: defaults are used and a warning is logged.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::media::HardwareAcceleration;
use crate::settings::PlayerSettings;
use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "STROBE_CONFIG";

/// Top-level TOML document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[player]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Maximum tolerated audio/video divergence before drop or delay
    #[serde(default = "default_sync_threshold_ms")]
    pub sync_threshold_ms: u64,

    #[serde(default = "default_buffer_size")]
    pub audio_buffer_size: usize,

    #[serde(default = "default_buffer_size")]
    pub video_buffer_size: usize,

    /// Hardware decoders to try, in order
    #[serde(default)]
    pub hardware_acceleration: Vec<HardwareAcceleration>,

    #[serde(default = "default_volume")]
    pub volume: f32,

    #[serde(default)]
    pub muted: bool,

    #[serde(default = "default_playback_speed")]
    pub playback_speed: f32,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file; stdout when absent
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_sync_threshold_ms() -> u64 {
    20
}

fn default_buffer_size() -> usize {
    8
}

fn default_volume() -> f32 {
    1.0
}

fn default_playback_speed() -> f32 {
    1.0
}

fn default_log_level() -> String {
    "strobe_player=debug,strobe_common=info".to_string()
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sync_threshold_ms: default_sync_threshold_ms(),
            audio_buffer_size: default_buffer_size(),
            video_buffer_size: default_buffer_size(),
            hardware_acceleration: Vec::new(),
            volume: default_volume(),
            muted: false,
            playback_speed: default_playback_speed(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl PlayerConfig {
    pub fn sync_threshold(&self) -> Duration {
        Duration::from_millis(self.sync_threshold_ms)
    }

    pub fn initial_settings(&self) -> PlayerSettings {
        PlayerSettings {
            volume: self.volume,
            is_muted: self.muted,
            playback_speed_factor: self.playback_speed,
        }
    }

    /// Reject values the player cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sync_threshold_ms == 0 {
            return Err(Error::Config("sync_threshold_ms must be positive".to_string()));
        }
        if self.audio_buffer_size == 0 || self.video_buffer_size == 0 {
            return Err(Error::Config("buffer sizes must be at least 1".to_string()));
        }
        self.initial_settings()
            .validate()
            .map_err(|e| Error::Config(e.to_string()))
    }
}

impl TomlConfig {
    /// Parse and validate a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.player.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is missing
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Resolve the config path by priority, then load it
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) => Self::load_or_default(&path),
            None => {
                warn!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Config file location following the documented priority order
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config directory
    dirs::config_dir().map(|dir| dir.join("strobe").join("strobe.toml"))
}
