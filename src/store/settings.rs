use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use validator::Validate;

use super::{keys, KeyValueStore, StoreError};
use crate::config::Config;
use crate::domain::{format_energy, persisted_energy, CreditLedger, WH_PER_KWH};

/// Values used for keys the store has never held.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsDefaults {
    pub initial_balance_kwh: f64,
    pub tariff_rate_per_kwh: f64,
    pub low_balance_threshold_kwh: f64,
    pub daily_limit_kwh: f64,
    pub sampling_period_ms: u64,
}

impl SettingsDefaults {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            initial_balance_kwh: cfg.ledger.initial_balance_kwh,
            tariff_rate_per_kwh: cfg.ledger.tariff_rate_per_kwh,
            low_balance_threshold_kwh: cfg.ledger.low_balance_threshold_kwh,
            daily_limit_kwh: cfg.ledger.daily_limit_kwh,
            sampling_period_ms: cfg.meter.sampling_period_ms,
        }
    }
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self {
            initial_balance_kwh: 0.0,
            tariff_rate_per_kwh: 1444.70,
            low_balance_threshold_kwh: 5.0,
            daily_limit_kwh: 10.0,
            sampling_period_ms: 1000,
        }
    }
}

/// Operator-supplied meter settings (command code 2)
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct SettingsUpdate {
    #[validate(range(min = 0.0))]
    pub tariff_rate_per_kwh: f64,
    #[validate(range(min = 0.0))]
    pub low_balance_threshold_kwh: f64,
    #[validate(range(min = 0.0))]
    pub daily_limit_kwh: f64,
    #[validate(range(min = 100, max = 3_600_000))]
    pub sampling_period_ms: u64,
}

/// Typed access to the settings and ledger fields.
#[derive(Clone)]
pub struct SettingsStore {
    kv: Arc<dyn KeyValueStore>,
    defaults: SettingsDefaults,
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, defaults: SettingsDefaults) -> Self {
        Self { kv, defaults }
    }

    pub fn defaults(&self) -> &SettingsDefaults {
        &self.defaults
    }

    /// Write defaults for every ledger/settings key that is still missing.
    pub async fn seed_defaults(&self) -> Result<(), StoreError> {
        let d = &self.defaults;
        let seeds = [
            (keys::BALANCE_WH, format_energy(d.initial_balance_kwh * WH_PER_KWH)),
            (keys::DAILY_USED_WH, format_energy(0.0)),
            (keys::TARIFF_RATE, format!("{:.2}", d.tariff_rate_per_kwh)),
            (keys::LOW_BALANCE_KWH, format!("{:.2}", d.low_balance_threshold_kwh)),
            (keys::DAILY_LIMIT_KWH, format!("{:.2}", d.daily_limit_kwh)),
            (keys::SAMPLING_PERIOD_MS, d.sampling_period_ms.to_string()),
        ];
        for (key, value) in seeds {
            if self.kv.get(key).await?.is_none() {
                self.kv.set(key, &value).await?;
                info!(key, %value, "seeded default");
            }
        }
        Ok(())
    }

    /// Read the full ledger. The store is authoritative; nothing is cached.
    pub async fn load_ledger(&self) -> Result<CreditLedger, StoreError> {
        let d = &self.defaults;
        Ok(CreditLedger {
            balance_wh: self
                .number(keys::BALANCE_WH, d.initial_balance_kwh * WH_PER_KWH)
                .await?
                .max(0.0),
            daily_used_wh: self.number(keys::DAILY_USED_WH, 0.0).await?.max(0.0),
            daily_limit_kwh: self.number(keys::DAILY_LIMIT_KWH, d.daily_limit_kwh).await?,
            low_balance_threshold_kwh: self
                .number(keys::LOW_BALANCE_KWH, d.low_balance_threshold_kwh)
                .await?,
            tariff_rate_per_kwh: self.number(keys::TARIFF_RATE, d.tariff_rate_per_kwh).await?,
        })
    }

    /// Persist balance and daily usage together, returning the ledger as a
    /// later [`load_ledger`](Self::load_ledger) will see it. On error neither
    /// value has changed.
    pub async fn save_energy(&self, ledger: &CreditLedger) -> Result<CreditLedger, StoreError> {
        self.kv
            .set_many(&[
                (keys::BALANCE_WH.to_string(), format_energy(ledger.balance_wh)),
                (keys::DAILY_USED_WH.to_string(), format_energy(ledger.daily_used_wh)),
            ])
            .await?;
        let mut persisted = *ledger;
        persisted.balance_wh = persisted_energy(ledger.balance_wh);
        persisted.daily_used_wh = persisted_energy(ledger.daily_used_wh);
        Ok(persisted)
    }

    pub async fn save_balance(&self, balance_wh: f64) -> Result<(), StoreError> {
        self.kv
            .set(keys::BALANCE_WH, &format_energy(balance_wh.max(0.0)))
            .await
    }

    pub async fn save_settings(&self, update: &SettingsUpdate) -> Result<(), StoreError> {
        self.kv
            .set_many(&[
                (keys::TARIFF_RATE.to_string(), format!("{:.2}", update.tariff_rate_per_kwh)),
                (
                    keys::LOW_BALANCE_KWH.to_string(),
                    format!("{:.2}", update.low_balance_threshold_kwh),
                ),
                (keys::DAILY_LIMIT_KWH.to_string(), format!("{:.2}", update.daily_limit_kwh)),
                (keys::SAMPLING_PERIOD_MS.to_string(), update.sampling_period_ms.to_string()),
            ])
            .await?;
        debug!(?update, "settings saved");
        Ok(())
    }

    pub async fn sampling_period(&self) -> Result<Duration, StoreError> {
        let ms = match self.kv.get(keys::SAMPLING_PERIOD_MS).await? {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| StoreError::Corrupt {
                key: keys::SAMPLING_PERIOD_MS.to_string(),
                value: raw.clone(),
            })?,
            None => self.defaults.sampling_period_ms,
        };
        Ok(Duration::from_millis(ms.max(1)))
    }

    pub async fn save_link_credentials(&self, ssid: &str, password: &str) -> Result<(), StoreError> {
        self.kv.set(keys::WIFI_SSID, ssid).await?;
        self.kv.set(keys::WIFI_PASSWORD, password).await
    }

    pub async fn save_notify_credentials(
        &self,
        bot_token: &str,
        recipient_id: &str,
    ) -> Result<(), StoreError> {
        self.kv.set(keys::BOT_TOKEN, bot_token).await?;
        self.kv.set(keys::RECIPIENT_ID, recipient_id).await
    }

    /// Raw text of a key, empty when absent
    pub async fn text(&self, key: &str) -> Result<String, StoreError> {
        Ok(self.kv.get(key).await?.unwrap_or_default())
    }

    async fn number(&self, key: &str, default: f64) -> Result<f64, StoreError> {
        match self.kv.get(key).await? {
            None => Ok(default),
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(StoreError::Corrupt {
                    key: key.to_string(),
                    value: raw,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockKeyValueStore};

    fn settings(store: Arc<MemoryStore>) -> SettingsStore {
        SettingsStore::new(store, SettingsDefaults::default())
    }

    #[tokio::test]
    async fn missing_keys_fall_back_to_defaults() {
        let ledger = settings(Arc::new(MemoryStore::new()))
            .load_ledger()
            .await
            .unwrap();
        assert_eq!(ledger.balance_wh, 0.0);
        assert_eq!(ledger.daily_limit_kwh, 10.0);
        assert_eq!(ledger.tariff_rate_per_kwh, 1444.70);
    }

    #[tokio::test]
    async fn seeding_keeps_existing_values() {
        let store = Arc::new(MemoryStore::with_values([(keys::BALANCE_WH, "1234.50")]));
        let settings = settings(store.clone());
        settings.seed_defaults().await.unwrap();
        assert_eq!(store.value(keys::BALANCE_WH).as_deref(), Some("1234.50"));
        assert_eq!(store.value(keys::DAILY_USED_WH).as_deref(), Some("0.00"));
        assert_eq!(store.value(keys::SAMPLING_PERIOD_MS).as_deref(), Some("1000"));
    }

    #[tokio::test]
    async fn save_energy_returns_what_was_written() {
        let store = Arc::new(MemoryStore::new());
        let settings = settings(store.clone());
        let mut ledger = settings.load_ledger().await.unwrap();
        ledger.balance_wh = 4999.938_888;
        ledger.daily_used_wh = 0.061_111;

        let persisted = settings.save_energy(&ledger).await.unwrap();
        assert_eq!(store.value(keys::BALANCE_WH).as_deref(), Some("4999.94"));
        assert_eq!(store.value(keys::DAILY_USED_WH).as_deref(), Some("0.06"));
        assert_eq!(persisted.balance_wh, 4999.94);
        assert_eq!(settings.load_ledger().await.unwrap(), persisted);
    }

    #[tokio::test]
    async fn save_energy_is_all_or_nothing() {
        let store = Arc::new(MemoryStore::with_values([
            (keys::BALANCE_WH, "1000.00"),
            (keys::DAILY_USED_WH, "5.00"),
        ]));
        store.fail_writes_for(keys::DAILY_USED_WH);
        let settings = settings(store.clone());
        let mut ledger = settings.load_ledger().await.unwrap();
        ledger.decrement(6.0);
        ledger.accumulate_daily(6.0);

        assert!(settings.save_energy(&ledger).await.is_err());
        assert_eq!(store.value(keys::BALANCE_WH).as_deref(), Some("1000.00"));
        assert_eq!(store.value(keys::DAILY_USED_WH).as_deref(), Some("5.00"));
    }

    #[tokio::test]
    async fn corrupt_number_is_reported() {
        let store = Arc::new(MemoryStore::with_values([(keys::BALANCE_WH, "lots")]));
        let err = settings(store).load_ledger().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn read_failure_propagates() {
        let mut kv = MockKeyValueStore::new();
        kv.expect_get().returning(|key: &str| {
            Err(StoreError::Read {
                key: key.to_string(),
                reason: "flash busy".to_string(),
            })
        });
        let settings = SettingsStore::new(Arc::new(kv), SettingsDefaults::default());
        assert!(matches!(
            settings.load_ledger().await,
            Err(StoreError::Read { .. })
        ));
    }

    #[test]
    fn settings_update_ranges() {
        let ok = SettingsUpdate {
            tariff_rate_per_kwh: 1444.70,
            low_balance_threshold_kwh: 5.0,
            daily_limit_kwh: 10.0,
            sampling_period_ms: 1000,
        };
        assert!(ok.validate().is_ok());
        let too_fast = SettingsUpdate {
            sampling_period_ms: 10,
            ..ok.clone()
        };
        assert!(too_fast.validate().is_err());
        let negative = SettingsUpdate {
            daily_limit_kwh: -1.0,
            ..ok
        };
        assert!(negative.validate().is_err());
    }
}
