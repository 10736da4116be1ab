//! Server configuration read from `tsubu.toml`.
//!
//! Every field has a default, so a missing file or a partial one is fine.
//!
//! ```toml
//! canvas_code = "1"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 4567
//! static_dir = "public"
//! connection_key = "session"   # or "ip"
//!
//! [board]
//! width = 100
//! height = 100
//! default_color = 0
//! palette = ["#FFFFFF", "#000000"]
//! snapshot_path = "board.dat"
//! save_interval_secs = 30
//! oversize_grace_secs = 20
//!
//! [cooldown]
//! mode = "activity"            # or "fixed"
//! base_secs = 30.0
//!
//! [stacking]
//! max_stacked = 6
//! cooldown_multiplier = 1.0
//!
//! [auth]
//! use_ip = true
//! registration_enabled = true
//! token_cookie = "pxls-token"
//!
//! [[auth.services]]
//! id = "discord"
//! name = "Discord"
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Color, MAX_COOLDOWN, Palette};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which key a live connection is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKeyMode {
    /// Session token when the client has one, IP address otherwise.
    #[default]
    Session,
    /// Always the IP address.
    Ip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooldownMode {
    Fixed,
    /// Scaled with the number of live connections.
    #[default]
    Activity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub connection_key: ConnectionKeyMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4567,
            static_dir: PathBuf::from("public"),
            connection_key: ConnectionKeyMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub width: u32,
    pub height: u32,
    pub default_color: u8,
    pub palette: Vec<String>,
    pub snapshot_path: PathBuf,
    pub save_interval_secs: u64,
    /// Delay before an oversized snapshot is truncated.
    pub oversize_grace_secs: u64,
}

fn default_palette() -> Vec<String> {
    [
        "#FFFFFF", "#E4E4E4", "#888888", "#222222", "#FFA7D1", "#E50000", "#E59500", "#A06A42",
        "#E5D900", "#94E044", "#02BE01", "#00D3DD", "#0083C7", "#0000EA", "#CF6EE4", "#820080",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            width: 100,
            height: 100,
            default_color: 0,
            palette: default_palette(),
            snapshot_path: PathBuf::from("board.dat"),
            save_interval_secs: 30,
            oversize_grace_secs: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub mode: CooldownMode,
    /// Base interval of the `fixed` mode.
    pub base_secs: f64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            mode: CooldownMode::default(),
            base_secs: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackingConfig {
    pub max_stacked: u32,
    pub cooldown_multiplier: f64,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            max_stacked: 6,
            cooldown_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthServiceConfig {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Treat connections without a session as anonymous per-IP identities.
    pub use_ip: bool,
    pub registration_enabled: bool,
    pub token_cookie: String,
    pub services: Vec<AuthServiceConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            use_ip: true,
            registration_enabled: true,
            token_cookie: "pxls-token".to_string(),
            services: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub canvas_code: String,
    pub server: ServerConfig,
    pub board: BoardConfig,
    pub cooldown: CooldownConfig,
    pub stacking: StackingConfig,
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            canvas_code: "1".to_string(),
            server: ServerConfig::default(),
            board: BoardConfig::default(),
            cooldown: CooldownConfig::default(),
            stacking: StackingConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    /// Read and validate the file at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw).map_err(|e| match e {
                ConfigError::Parse { message, .. } => ConfigError::Parse {
                    path: path.to_path_buf(),
                    message,
                },
                other => other,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("{} not found, using default configuration", path.display());
                Self::default()
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text without validating it.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let board = &self.board;
        if board.width == 0 || board.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "board size must be positive, got {}x{}",
                board.width, board.height
            )));
        }
        let palette = self.palette()?;
        if !palette.contains_index(board.default_color) {
            return Err(ConfigError::Invalid(format!(
                "board.default_color {} is outside the {}-color palette",
                board.default_color,
                palette.len()
            )));
        }
        if self.stacking.max_stacked == 0 {
            return Err(ConfigError::Invalid(
                "stacking.max_stacked must be at least 1".to_string(),
            ));
        }
        let multiplier = self.stacking.cooldown_multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ConfigError::Invalid(
                "stacking.cooldown_multiplier must be a positive number".to_string(),
            ));
        }
        let base_secs = self.cooldown.base_secs;
        if !base_secs.is_finite() || base_secs <= 0.0 {
            return Err(ConfigError::Invalid(
                "cooldown.base_secs must be positive".to_string(),
            ));
        }
        if self.cooldown.mode == CooldownMode::Fixed {
            let longest = base_secs * multiplier * (f64::from(self.stacking.max_stacked) + 1.0);
            if longest > MAX_COOLDOWN.as_secs_f64() {
                return Err(ConfigError::Invalid(format!(
                    "cooldown at a full stack is {:.0}s, longer than the {}s limit",
                    longest,
                    MAX_COOLDOWN.as_secs()
                )));
            }
        }
        if board.save_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "board.save_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured palette; 1 to 256 `#RRGGBB` entries.
    pub fn palette(&self) -> Result<Palette, ConfigError> {
        let entries = &self.board.palette;
        if entries.is_empty() || entries.len() > 256 {
            return Err(ConfigError::Invalid(format!(
                "board.palette must have 1 to 256 colors, got {}",
                entries.len()
            )));
        }
        let colors = entries
            .iter()
            .map(|raw| {
                Color::parse_hex(raw).ok_or_else(|| {
                    ConfigError::Invalid(format!("board.palette entry '{}' is not #RRGGBB", raw))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Palette::new(colors))
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.board.save_interval_secs)
    }

    pub fn oversize_grace(&self) -> Duration {
        Duration::from_secs(self.board.oversize_grace_secs)
    }

    pub fn base_cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown.base_secs)
            .map_or(MAX_COOLDOWN, |base| base.min(MAX_COOLDOWN))
    }
}
