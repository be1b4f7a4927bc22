//! Persistent key-value storage for settings and the credit ledger.
//!
//! Every value is a string, as on the meter's flash store. [`SettingsStore`]
//! layers typed access on top of any [`KeyValueStore`].

pub mod file;
pub mod memory;
pub mod settings;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use settings::{SettingsStore, SettingsUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store read failed for `{key}`: {reason}")]
    Read { key: String, reason: String },
    #[error("Store write failed for `{key}`: {reason}")]
    Write { key: String, reason: String },
    #[error("Stored value for `{key}` is not a number: {value:?}")]
    Corrupt { key: String, value: String },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Write every entry or none of them.
    async fn set_many(&self, entries: &[(String, String)]) -> Result<(), StoreError>;
}

/// Names of the persisted fields
pub mod keys {
    pub const BALANCE_WH: &str = "balance_wh";
    pub const DAILY_USED_WH: &str = "daily_used_wh";
    pub const DAILY_LIMIT_KWH: &str = "daily_limit_kwh";
    pub const LOW_BALANCE_KWH: &str = "low_balance_kwh";
    pub const TARIFF_RATE: &str = "tariff_rate";
    pub const SAMPLING_PERIOD_MS: &str = "sampling_period_ms";
    pub const WIFI_SSID: &str = "wifi_ssid";
    pub const WIFI_PASSWORD: &str = "wifi_password";
    pub const BOT_TOKEN: &str = "bot_token";
    pub const RECIPIENT_ID: &str = "recipient_id";
}
