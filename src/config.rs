use anyhow::Result;
use figment::{providers::{Env, Format, Serialized, Toml}, Figment};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{IntegrationInterval, DEFAULT_CAPACITY_W};
use crate::hardware::HardwareMode;
use crate::notify::DEFAULT_THROTTLE_WINDOW;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
    pub meter: MeterConfig,
    pub ledger: LedgerConfig,
    pub store: StoreConfig,
    pub notify: NotifyConfig,
    pub hardware: HardwareConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub token: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Default control loop period until the store holds one
    pub sampling_period_ms: u64,
    /// Installation rating; draws above it skip the tick
    pub capacity_w: f64,
    /// Ticks between low-balance alerts
    pub alert_throttle_cycles: u32,
    /// How long a command keeps the ledger after its write
    pub guard_settle_ms: u64,
    pub integration: IntegrationInterval,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            sampling_period_ms: 1000,
            capacity_w: DEFAULT_CAPACITY_W,
            alert_throttle_cycles: DEFAULT_THROTTLE_WINDOW,
            guard_settle_ms: 0,
            integration: IntegrationInterval::Nominal,
        }
    }
}

impl MeterConfig {
    pub fn guard_settle(&self) -> Duration {
        Duration::from_millis(self.guard_settle_ms)
    }
}

/// Values seeded into an empty store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub initial_balance_kwh: f64,
    pub tariff_rate_per_kwh: f64,
    pub low_balance_threshold_kwh: f64,
    pub daily_limit_kwh: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_balance_kwh: 0.0,
            tariff_rate_per_kwh: 1444.70,
            low_balance_threshold_kwh: 5.0,
            daily_limit_kwh: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/meter-store.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyProvider {
    Telegram,
    #[default]
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub provider: NotifyProvider,
    pub base_url: String,
    pub http_timeout_seconds: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            provider: NotifyProvider::Log,
            base_url: crate::notify::telegram::DEFAULT_TELEGRAM_URL.to_string(),
            http_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    pub mode: HardwareMode,
    /// Load drawn by the simulated sensor
    pub simulated_load_w: f64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            mode: HardwareMode::default(),
            simulated_load_w: 220.0,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::figment(Figment::new().merge(Toml::file("config/default.toml")))
    }

    fn figment(files: Figment) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(files)
            .merge(Env::prefixed("PPM__").split("__"));
        Ok(figment.extract()?)
    }
}
