use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use crate::domain::BatteryCapabilities;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "SOCBID__";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub battery: BatteryConfig,
    #[validate(nested)]
    pub controller: ControllerConfig,
    pub logging: LoggingConfig,
}

/// Static battery parameters, fixed for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatteryConfig {
    #[validate(range(exclusive_min = 0.0))]
    pub capacity_kwh: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub initial_soc_percent: f64,
    #[validate(range(min = 0.0))]
    pub max_charge_w: f64,
    #[validate(range(min = 0.0))]
    pub max_discharge_w: f64,
    /// Background SoC monitor poll period
    #[validate(range(min = 1))]
    pub monitor_interval_ms: u64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 15.0,
            initial_soc_percent: 50.0,
            max_charge_w: 120.0,
            max_discharge_w: 100.0,
            monitor_interval_ms: 1000,
        }
    }
}

impl BatteryConfig {
    pub fn capabilities(&self) -> BatteryCapabilities {
        BatteryCapabilities {
            capacity_kwh: self.capacity_kwh,
            max_charge_w: self.max_charge_w,
            max_discharge_w: self.max_discharge_w,
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ControllerConfig {
    pub bid_file: PathBuf,
    /// `edge` or `smooth`; asked for on stdin when unset
    pub mode: Option<String>,
    #[validate(range(exclusive_min = 0.0))]
    pub remaining_time_hours: f64,
    /// |target - current| at or below this is treated as on-target.
    /// Zero keeps exact-equality standby.
    #[validate(range(min = 0.0))]
    pub standby_deadband_percent: f64,
    pub slot_pause_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bid_file: PathBuf::from("data/soc_bids.csv"),
            mode: None,
            remaining_time_hours: 1.0,
            standby_deadband_percent: 0.0,
            slot_pause_ms: 0,
        }
    }
}

impl ControllerConfig {
    pub fn slot_pause(&self) -> Duration {
        Duration::from_millis(self.slot_pause_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            filter: "info".into(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file at `path` (if present), then `SOCBID__*` env vars.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let cfg: Config = Self::figment(path)
            .extract()
            .with_context(|| format!("loading configuration from {}", path.display()))?;
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}
