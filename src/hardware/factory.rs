use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::HardwareMode;
use crate::config::{Config, NotifyProvider};
use crate::controller::{Collaborators, MeterContext};
use crate::domain::{
    LogDisplay, RelayActuator, SampleReading, ScriptedSensor, Sensor, SimulatedRelay,
    StatusDisplay,
};
use crate::notify::{LogNotifier, Notifier, TelegramNotifier};
use crate::store::settings::SettingsDefaults;
use crate::store::{FileStore, KeyValueStore, MemoryStore, SettingsStore};

/// Nominal line voltage for the mock sensor
const MOCK_VOLTAGE_V: f64 = 220.0;

/// Builds the meter's collaborators for the configured hardware mode.
pub struct DeviceFactory {
    mode: HardwareMode,
    config: Config,
}

impl DeviceFactory {
    pub fn new(config: Config) -> Self {
        Self {
            mode: config.hardware.mode,
            config,
        }
    }

    pub fn with_mode(mode: HardwareMode, config: Config) -> Self {
        Self { mode, config }
    }

    pub fn mode(&self) -> HardwareMode {
        self.mode
    }

    pub fn create_sensor(&self) -> Arc<dyn Sensor> {
        let load_w = self.config.hardware.simulated_load_w;
        match self.mode {
            #[cfg(feature = "sim")]
            HardwareMode::Simulated => Arc::new(crate::domain::SimulatedSensor::new(load_w)),
            #[cfg(not(feature = "sim"))]
            HardwareMode::Simulated => {
                warn!("built without `sim`, using a steady mock sensor");
                Arc::new(Self::steady_sensor(load_w))
            }
            HardwareMode::Mock => Arc::new(Self::steady_sensor(load_w)),
        }
    }

    pub fn create_relay(&self) -> Arc<dyn RelayActuator> {
        Arc::new(SimulatedRelay::new())
    }

    pub async fn create_store(&self) -> Result<Arc<dyn KeyValueStore>> {
        match self.mode {
            HardwareMode::Simulated => {
                let path = &self.config.store.path;
                let store = FileStore::open(path)
                    .await
                    .with_context(|| format!("opening store at {}", path.display()))?;
                info!(path = %path.display(), "file store opened");
                Ok(Arc::new(store))
            }
            HardwareMode::Mock => {
                warn!("mock hardware: ledger is kept in memory only");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }

    pub fn create_notifier(&self, settings: &SettingsStore) -> Result<Arc<dyn Notifier>> {
        let notify = &self.config.notify;
        match notify.provider {
            NotifyProvider::Telegram => {
                let notifier = TelegramNotifier::new(
                    notify.base_url.clone(),
                    Duration::from_secs(notify.http_timeout_seconds),
                    settings.clone(),
                )?;
                Ok(Arc::new(notifier))
            }
            NotifyProvider::Log => Ok(Arc::new(LogNotifier)),
        }
    }

    pub fn create_display(&self) -> Arc<dyn StatusDisplay> {
        Arc::new(LogDisplay)
    }

    /// Wire every collaborator into a fresh meter context.
    pub async fn build_context(&self) -> Result<Arc<MeterContext>> {
        let kv = self.create_store().await?;
        let settings = SettingsStore::new(kv, SettingsDefaults::from_config(&self.config));
        let parts = Collaborators {
            sensor: self.create_sensor(),
            relay: self.create_relay(),
            notifier: self.create_notifier(&settings)?,
            display: self.create_display(),
            settings,
        };
        info!(mode = %self.mode, provider = ?self.config.notify.provider, "meter context built");
        Ok(Arc::new(MeterContext::new(parts, &self.config.meter)))
    }

    fn steady_sensor(load_w: f64) -> ScriptedSensor {
        ScriptedSensor::steady(SampleReading::new(MOCK_VOLTAGE_V, load_w / MOCK_VOLTAGE_V, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_mode_builds_in_memory_context() {
        let mut cfg = Config::default();
        cfg.hardware.simulated_load_w = 440.0;
        let factory = DeviceFactory::with_mode(HardwareMode::Mock, cfg);
        let ctx = factory.build_context().await.unwrap();

        let reading = ctx.sensor.read().await.unwrap();
        assert!((reading.active_power_w() - 440.0).abs() < 1e-9);
        assert_eq!(ctx.status().await.unwrap().balance_wh, 0.0);
    }

    #[tokio::test]
    async fn simulated_mode_persists_to_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.store.path = dir.path().join("meter.json");
        let ctx = DeviceFactory::with_mode(HardwareMode::Simulated, cfg)
            .build_context()
            .await
            .unwrap();

        ctx.top_up(1.5).await.unwrap();
        let raw = std::fs::read_to_string(dir.path().join("meter.json")).unwrap();
        assert!(raw.contains("1500.00"));
    }
}
