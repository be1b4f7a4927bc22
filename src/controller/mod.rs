pub mod control_loop;
pub mod guard;
pub mod policy;
pub mod relay;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::MeterConfig;
use crate::domain::{
    CreditLedger, DisplayRow, EnergyIntegrator, LedgerError, RelayActuator, Sensor,
    StatusDisplay,
};
use crate::notify::{NotificationThrottler, Notifier};
use crate::store::{keys, SettingsStore, SettingsUpdate, StoreError};

pub use control_loop::{ControlLoop, SkipReason, TickOutcome, TickReport};
pub use guard::{ExclusiveAccess, GuardFlags, GuardIntent, LedgerGuard};
pub use relay::{RelayController, RelayEvent, RelayOverride};

#[derive(Debug, Error)]
pub enum TopUpError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// External collaborators the meter is wired to
pub struct Collaborators {
    pub settings: SettingsStore,
    pub sensor: Arc<dyn Sensor>,
    pub relay: Arc<dyn RelayActuator>,
    pub notifier: Arc<dyn Notifier>,
    pub display: Arc<dyn StatusDisplay>,
}

/// Measurements from the most recent completed tick
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LastTick {
    pub at: DateTime<Utc>,
    pub power_w: f64,
    pub energy_wh: f64,
}

/// State shared by the control loop and the command dispatcher.
pub struct MeterContext {
    pub settings: SettingsStore,
    pub guard: LedgerGuard,
    pub integrator: EnergyIntegrator,
    pub sensor: Arc<dyn Sensor>,
    pub relay: Mutex<RelayController>,
    pub throttler: Mutex<NotificationThrottler>,
    pub notifier: Arc<dyn Notifier>,
    pub display: Arc<dyn StatusDisplay>,
    pub last_tick: Mutex<Option<LastTick>>,
    pub shutdown: CancellationToken,
    guard_settle: Duration,
    shutdown_hold: Mutex<Option<ExclusiveAccess>>,
}

impl MeterContext {
    pub fn new(parts: Collaborators, cfg: &MeterConfig) -> Self {
        Self {
            settings: parts.settings,
            guard: LedgerGuard::new(),
            integrator: EnergyIntegrator::new(cfg.capacity_w, cfg.integration),
            sensor: parts.sensor,
            relay: Mutex::new(RelayController::new(parts.relay)),
            throttler: Mutex::new(NotificationThrottler::new(cfg.alert_throttle_cycles)),
            notifier: parts.notifier,
            display: parts.display,
            last_tick: Mutex::new(None),
            shutdown: CancellationToken::new(),
            guard_settle: cfg.guard_settle(),
            shutdown_hold: Mutex::new(None),
        }
    }

    /// Credit `amount_kwh` under the top-up guard.
    pub async fn top_up(&self, amount_kwh: f64) -> Result<CreditLedger, TopUpError> {
        let access = self.guard.acquire(GuardIntent::ToppingUp).await;
        let mut ledger = self.settings.load_ledger().await?;
        let before_wh = ledger.balance_wh;
        ledger.top_up(amount_kwh)?;
        self.settings.save_balance(ledger.balance_wh).await?;
        info!(before_wh, after_wh = ledger.balance_wh, amount_kwh, "credit topped up");
        self.settle(access).await;
        Ok(ledger)
    }

    /// Zero the balance under the reset guard. The previous balance is
    /// never parsed, so this also clears an unreadable stored value.
    pub async fn reset_to_zero(&self) -> Result<(), StoreError> {
        let access = self.guard.acquire(GuardIntent::ResettingToZero).await;
        let before = self.settings.text(keys::BALANCE_WH).await.ok();
        self.settings.save_balance(0.0).await?;
        warn!(?before, "credit reset to zero");
        self.settle(access).await;
        Ok(())
    }

    pub async fn update_settings(&self, update: &SettingsUpdate) -> Result<(), StoreError> {
        let access = self.guard.acquire(GuardIntent::UpdatingSettings).await;
        self.settings.save_settings(update).await?;
        info!(?update, "meter settings updated");
        self.settle(access).await;
        Ok(())
    }

    /// Stop the control loop for good. The ledger stays locked so no tick
    /// can run between now and process exit.
    pub async fn begin_shutdown(&self) {
        let access = self.guard.acquire(GuardIntent::ShuttingDown).await;
        *self.shutdown_hold.lock() = Some(access);
        self.shutdown.cancel();
        warn!("shutdown requested");
    }

    pub fn show(&self, row: DisplayRow, text: &str) {
        self.display.show(row, text);
    }

    /// Snapshot for the status endpoint and the balance query
    pub async fn status(&self) -> Result<MeterStatus, StoreError> {
        let ledger = self.settings.load_ledger().await?;
        let sampling_period_ms = self.settings.sampling_period().await?.as_millis() as u64;
        let (overrides, relay_on) = {
            let relay = self.relay.lock();
            (relay.overrides(), relay.output())
        };
        let (cycles_since_last_alert, exhausted_alert_sent) = {
            let throttler = self.throttler.lock();
            (throttler.cycles_since_last_alert(), throttler.exhausted_alert_sent())
        };
        Ok(MeterStatus {
            balance_wh: ledger.balance_wh,
            balance_kwh: ledger.balance_kwh(),
            balance_value: ledger.balance_value(),
            daily_used_wh: ledger.daily_used_wh,
            daily_limit_kwh: ledger.daily_limit_kwh,
            low_balance_threshold_kwh: ledger.low_balance_threshold_kwh,
            tariff_rate_per_kwh: ledger.tariff_rate_per_kwh,
            sampling_period_ms,
            relay_on,
            overrides,
            guard: self.guard.flags(),
            cycles_since_last_alert,
            exhausted_alert_sent,
            last_tick: *self.last_tick.lock(),
        })
    }

    async fn settle(&self, access: ExclusiveAccess) {
        if !self.guard_settle.is_zero() {
            tokio::time::sleep(self.guard_settle).await;
        }
        drop(access);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MeterStatus {
    pub balance_wh: f64,
    pub balance_kwh: f64,
    /// Balance priced at the current tariff
    pub balance_value: f64,
    pub daily_used_wh: f64,
    pub daily_limit_kwh: f64,
    pub low_balance_threshold_kwh: f64,
    pub tariff_rate_per_kwh: f64,
    pub sampling_period_ms: u64,
    pub relay_on: Option<bool>,
    pub overrides: RelayOverride,
    pub guard: GuardFlags,
    pub cycles_since_last_alert: u32,
    pub exhausted_alert_sent: bool,
    pub last_tick: Option<LastTick>,
}

pub fn spawn_controller_tasks(ctx: Arc<MeterContext>) -> JoinHandle<()> {
    tokio::spawn(async move {
        ControlLoop::new(ctx).run().await;
    })
}
