//! Shard configuration module
//!
//! Handles loading and parsing of shard configuration from files and
//! environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Policy for reported positions that drift from the authoritative one
///
/// The drift check compares the position carried by a client motion report
/// against the last accepted position whenever the server is not itself
/// moving the object. `Log` keeps the check observational; `Enforce` turns
/// drift beyond tolerance into a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftPolicy {
    /// Log drift at warn level, accept the report
    #[default]
    Log,
    /// Reject the report and disconnect the session
    Enforce,
}

/// Shard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// World-plane tile edge length in world units
    #[serde(default = "default_tile_size")]
    pub tile_size: f32,

    /// Sight radius in tiles (square radius, AOI window is (2r+1)^2 tiles)
    #[serde(default = "default_sight_radius")]
    pub sight_radius: i32,

    /// Lag tolerance for unacknowledged forced changes, in milliseconds
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Maximum accepted distance between reported and authoritative position
    #[serde(default = "default_drift_tolerance")]
    pub drift_tolerance: f32,

    /// What to do when a report drifts beyond tolerance
    #[serde(default)]
    pub drift_policy: DriftPolicy,

    /// Maximum number of sessions in this shard
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

// Default value functions
fn default_tile_size() -> f32 {
    66.667
}

fn default_sight_radius() -> i32 {
    2
}

fn default_ack_timeout_ms() -> u64 {
    1500
}

fn default_drift_tolerance() -> f32 {
    50.0
}

fn default_max_sessions() -> usize {
    2000
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/shard.toml"),
            tile_size: default_tile_size(),
            sight_radius: default_sight_radius(),
            ack_timeout_ms: default_ack_timeout_ms(),
            drift_tolerance: default_drift_tolerance(),
            drift_policy: DriftPolicy::default(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl ShardConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("SHARDSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/shard.toml"));

        // Try to load from file
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SHARDSYNC_TILE_SIZE") {
            if let Ok(size) = val.parse() {
                self.tile_size = size;
            }
        }
        if let Ok(val) = env::var("SHARDSYNC_SIGHT_RADIUS") {
            if let Ok(radius) = val.parse() {
                self.sight_radius = radius;
            }
        }
        if let Ok(val) = env::var("SHARDSYNC_ACK_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                self.ack_timeout_ms = timeout;
            }
        }
        if let Ok(val) = env::var("SHARDSYNC_DRIFT_TOLERANCE") {
            if let Ok(tolerance) = val.parse() {
                self.drift_tolerance = tolerance;
            }
        }
        if let Ok(val) = env::var("SHARDSYNC_DRIFT_POLICY") {
            match val.to_lowercase().as_str() {
                "log" => self.drift_policy = DriftPolicy::Log,
                "enforce" => self.drift_policy = DriftPolicy::Enforce,
                _ => {}
            }
        }
        if let Ok(val) = env::var("SHARDSYNC_MAX_SESSIONS") {
            if let Ok(max) = val.parse() {
                self.max_sessions = max;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.tile_size.is_finite() || self.tile_size <= 0.0 {
            anyhow::bail!("Tile size must be a positive finite number");
        }

        if !(1..=16).contains(&self.sight_radius) {
            anyhow::bail!("Sight radius must be between 1 and 16 tiles");
        }

        if self.ack_timeout_ms < 100 || self.ack_timeout_ms > 60_000 {
            anyhow::bail!("Ack timeout must be between 100ms and 60000ms");
        }

        if !self.drift_tolerance.is_finite() || self.drift_tolerance <= 0.0 {
            anyhow::bail!("Drift tolerance must be a positive finite number");
        }

        if self.max_sessions == 0 || self.max_sessions > 10000 {
            anyhow::bail!("Max sessions must be between 1 and 10000");
        }

        Ok(())
    }
}
