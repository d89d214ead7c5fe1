//! Server configuration
//!
//! Defaults can be overridden by a JSON file, which can in turn be
//! overridden by command line flags (see `main.rs`).

use crate::game::{ArenaRules, EdgePolicy};
use crate::simulation::DEFAULT_PAST_SIZE;
use serde::{Deserialize, Serialize};
use shared::{DEFAULT_PORT, DEFAULT_TICK_RATE};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Ticks per second, also sent to clients in `GameConfig`
    pub tick_rate: u8,
    pub title: String,
    pub description: String,
    /// Ticks of event history kept for delta catch-up
    pub sim_past_size: u32,
    /// Queued bytes for one session above which it is resynced from a snapshot
    pub max_backlog_bytes: usize,
    pub seed: Option<u64>,
    pub rules: ArenaRules,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            title: "Snake Arena".to_string(),
            description: "Eat, grow, don't crash".to_string(),
            sim_past_size: DEFAULT_PAST_SIZE,
            max_backlog_bytes: 64 * 1024,
            seed: None,
            rules: ArenaRules::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be at least 1".into()));
        }
        if self.rules.width < 2 || self.rules.height < 2 {
            return Err(ConfigError::Invalid("board must be at least 2x2".into()));
        }
        if self.rules.move_interval == 0 {
            return Err(ConfigError::Invalid("move_interval must be at least 1".into()));
        }
        if self.title.len() > shared::codec::MAX_TEXT_LEN
            || self.description.len() > shared::codec::MAX_TEXT_LEN
        {
            return Err(ConfigError::Invalid(
                "title and description are limited to 255 bytes".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn with_edge_policy(mut self, edge: EdgePolicy) -> Self {
        self.rules.edge = edge;
        self
    }
}
