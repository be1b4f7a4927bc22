#![allow(dead_code)]
//! In-memory meter wiring shared by the integration tests.

use std::sync::Arc;

use prepaid_meter_controller::command::CommandDispatcher;
use prepaid_meter_controller::config::MeterConfig;
use prepaid_meter_controller::controller::{Collaborators, ControlLoop, MeterContext};
use prepaid_meter_controller::domain::{MemoryDisplay, SampleReading, ScriptedSensor, SimulatedRelay};
use prepaid_meter_controller::notify::RecordingNotifier;
use prepaid_meter_controller::store::settings::SettingsDefaults;
use prepaid_meter_controller::store::{keys, MemoryStore, SettingsStore};

pub struct Meter {
    pub ctx: Arc<MeterContext>,
    pub control: ControlLoop,
    pub dispatcher: CommandDispatcher,
    pub store: Arc<MemoryStore>,
    pub sensor: Arc<ScriptedSensor>,
    pub relay: Arc<SimulatedRelay>,
    pub notifier: Arc<RecordingNotifier>,
    pub display: Arc<MemoryDisplay>,
}

/// 220 V at 1 A with unity power factor
pub fn load_220w() -> SampleReading {
    SampleReading::new(220.0, 1.0, 1.0)
}

pub fn meter(balance_wh: &str) -> Meter {
    meter_with(&[(keys::BALANCE_WH, balance_wh)], MeterConfig::default())
}

pub fn meter_with(values: &[(&str, &str)], cfg: MeterConfig) -> Meter {
    let store = Arc::new(MemoryStore::with_values(values.iter().copied()));
    let sensor = Arc::new(ScriptedSensor::steady(load_220w()));
    let relay = Arc::new(SimulatedRelay::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let display = Arc::new(MemoryDisplay::new());
    let ctx = Arc::new(MeterContext::new(
        Collaborators {
            settings: SettingsStore::new(store.clone(), SettingsDefaults::default()),
            sensor: sensor.clone(),
            relay: relay.clone(),
            notifier: notifier.clone(),
            display: display.clone(),
        },
        &cfg,
    ));
    Meter {
        control: ControlLoop::new(ctx.clone()),
        dispatcher: CommandDispatcher::new(ctx.clone()),
        ctx,
        store,
        sensor,
        relay,
        notifier,
        display,
    }
}

impl Meter {
    pub fn stored(&self, key: &str) -> Option<String> {
        self.store.value(key)
    }

    pub fn stored_balance(&self) -> f64 {
        self.stored(keys::BALANCE_WH)
            .and_then(|v| v.parse().ok())
            .unwrap_or(f64::NAN)
    }

    pub async fn ticks(&mut self, n: usize) {
        for _ in 0..n {
            self.control.tick().await;
        }
    }
}
