// src/config/mod.rs - Configuration for the mock server and tail client
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration, loaded from TOML.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub simulator: SimulatorConfig,

    #[serde(default)]
    pub log_mock: LogMockConfig,

    #[serde(default)]
    pub tail: TailSettings,
}

/// Web server bind settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Timing and behavior of the print-job simulation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatorConfig {
    /// Seconds between simulation ticks. Also the temperature ramp step width.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Fixed delay spent in the `downloading` state.
    #[serde(default = "default_download_delay_secs")]
    pub download_delay_secs: u64,

    /// Number of ramp steps from ambient to target temperature.
    #[serde(default = "default_heat_steps")]
    pub heat_steps: u32,

    /// Number of ramp steps back to ambient after a print ends.
    #[serde(default = "default_cool_steps")]
    pub cool_steps: u32,

    #[serde(default = "default_ambient_temp")]
    pub ambient_temp: f64,

    #[serde(default = "default_nozzle_target")]
    pub nozzle_target: f64,

    #[serde(default = "default_hotbed_target")]
    pub hotbed_target: f64,

    /// Floor for the estimated print duration, so small files still take a
    /// visible amount of time.
    #[serde(default = "default_min_print_secs")]
    pub min_print_secs: u64,

    /// Simulated print throughput used to estimate duration from file size.
    #[serde(default = "default_bytes_per_sec")]
    pub bytes_per_sec: u64,

    /// How long a finished job stays visible after the cooldown ramp.
    #[serde(default = "default_job_clear_grace_secs")]
    pub job_clear_grace_secs: u64,

    /// Probability that ETA or layer metadata is withheld from a new job,
    /// simulating gcode files without slicer metadata.
    #[serde(default = "default_withhold_probability")]
    pub withhold_probability: f64,
}

/// Behavior of the mock system log.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogMockConfig {
    /// Seconds between appended log lines while the server runs.
    #[serde(default = "default_growth_interval_secs")]
    pub growth_interval_secs: u64,

    /// Pre-pad the log with generated history so the partial-load path of
    /// clients is exercised immediately.
    #[serde(default = "default_seed_history")]
    pub seed_history: bool,

    /// Approximate size of the generated history in bytes.
    #[serde(default = "default_history_target_bytes")]
    pub history_target_bytes: u64,
}

/// Defaults for the log tail client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TailSettings {
    /// Above this size the initial load fetches only the tail of the log.
    #[serde(default = "default_size_ceiling")]
    pub size_ceiling: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
}

fn default_bind_address() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_tick_secs() -> u64 { 1 }
fn default_download_delay_secs() -> u64 { 3 }
fn default_heat_steps() -> u32 { 15 }
fn default_cool_steps() -> u32 { 10 }
fn default_ambient_temp() -> f64 { 25.0 }
fn default_nozzle_target() -> f64 { 210.0 }
fn default_hotbed_target() -> f64 { 60.0 }
fn default_min_print_secs() -> u64 { 120 }
fn default_bytes_per_sec() -> u64 { 1024 }
fn default_job_clear_grace_secs() -> u64 { 2 }
fn default_withhold_probability() -> f64 { 0.25 }
fn default_growth_interval_secs() -> u64 { 3 }
fn default_seed_history() -> bool { true }
fn default_history_target_bytes() -> u64 { 250 * 1024 }
fn default_size_ceiling() -> u64 { 200 * 1024 }
fn default_poll_interval_secs() -> u64 { 2 }
fn default_max_retries() -> u32 { 5 }
fn default_initial_retry_delay_ms() -> u64 { 1000 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            download_delay_secs: default_download_delay_secs(),
            heat_steps: default_heat_steps(),
            cool_steps: default_cool_steps(),
            ambient_temp: default_ambient_temp(),
            nozzle_target: default_nozzle_target(),
            hotbed_target: default_hotbed_target(),
            min_print_secs: default_min_print_secs(),
            bytes_per_sec: default_bytes_per_sec(),
            job_clear_grace_secs: default_job_clear_grace_secs(),
            withhold_probability: default_withhold_probability(),
        }
    }
}

impl Default for LogMockConfig {
    fn default() -> Self {
        Self {
            growth_interval_secs: default_growth_interval_secs(),
            seed_history: default_seed_history(),
            history_target_bytes: default_history_target_bytes(),
        }
    }
}

impl Default for TailSettings {
    fn default() -> Self {
        Self {
            size_ceiling: default_size_ceiling(),
            poll_interval_secs: default_poll_interval_secs(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. A missing file is not an error:
    /// the mock server is meant to run out of the box, so defaults apply.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            tracing::info!("No config file at '{}', using defaults", path);
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulator.heat_steps == 0 {
            return Err(ConfigError::Invalid("heat_steps must be positive".into()));
        }
        if self.simulator.cool_steps == 0 {
            return Err(ConfigError::Invalid("cool_steps must be positive".into()));
        }
        if self.simulator.tick_secs == 0 {
            return Err(ConfigError::Invalid("tick_secs must be positive".into()));
        }
        if self.simulator.bytes_per_sec == 0 {
            return Err(ConfigError::Invalid("bytes_per_sec must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.simulator.withhold_probability) {
            return Err(ConfigError::Invalid(
                "withhold_probability must be between 0 and 1".into(),
            ));
        }
        if self.simulator.nozzle_target <= self.simulator.ambient_temp {
            return Err(ConfigError::Invalid(
                "nozzle_target must be above ambient_temp".into(),
            ));
        }
        if self.tail.size_ceiling == 0 {
            return Err(ConfigError::Invalid("size_ceiling must be positive".into()));
        }
        Ok(())
    }
}
