use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::policy;
use super::{GuardIntent, LastTick, MeterContext, RelayEvent};
use crate::domain::{status_line, CreditLedger, DisplayRow, SensorError, SubCentCarry};
use crate::notify::Alert;
use crate::store::StoreError;

/// Why a tick left the ledger untouched
#[derive(Debug)]
pub enum SkipReason {
    /// A command holds the ledger
    GuardHeld(Option<GuardIntent>),
    Store(StoreError),
    Sensor(SensorError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Exact ledger after this tick, including energy below the stored resolution
    pub ledger: CreditLedger,
    pub power_w: f64,
    pub energy_wh: f64,
    pub alert: Option<Alert>,
    pub relay_event: Option<RelayEvent>,
    pub daily_cap_reached: bool,
}

#[derive(Debug)]
pub enum TickOutcome {
    Completed(TickReport),
    Skipped(SkipReason),
}

impl TickOutcome {
    pub fn report(&self) -> Option<&TickReport> {
        match self {
            TickOutcome::Completed(report) => Some(report),
            TickOutcome::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TickOutcome::Skipped(_))
    }
}

/// Periodic sense, integrate, bill, decide, actuate.
pub struct ControlLoop {
    ctx: Arc<MeterContext>,
    carry: SubCentCarry,
    period: Duration,
}

impl ControlLoop {
    pub fn new(ctx: Arc<MeterContext>) -> Self {
        let period = Duration::from_millis(ctx.settings.defaults().sampling_period_ms.max(1));
        Self {
            ctx,
            carry: SubCentCarry::default(),
            period,
        }
    }

    pub async fn run(mut self) {
        if let Err(e) = self.ctx.settings.seed_defaults().await {
            warn!(error = %e, "could not seed default settings");
        }
        info!(period_ms = self.period.as_millis() as u64, "control loop started");

        while !self.ctx.shutdown.is_cancelled() {
            self.tick().await;
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.period) => {}
            }
        }
        info!("control loop stopped");
    }

    /// One iteration. Either every effect of the tick lands or none does.
    pub async fn tick(&mut self) -> TickOutcome {
        let Some(access) = self.ctx.guard.try_acquire(GuardIntent::ControlTick) else {
            let holder = self.ctx.guard.holder();
            debug!(?holder, "ledger guarded, tick skipped");
            return TickOutcome::Skipped(SkipReason::GuardHeld(holder));
        };

        match self.ctx.settings.sampling_period().await {
            Ok(period) => self.period = period,
            Err(e) => warn!(error = %e, "sampling period unreadable, keeping previous"),
        }

        let stored = match self.ctx.settings.load_ledger().await {
            Ok(ledger) => ledger,
            Err(e) => {
                error!(error = %e, "ledger read failed, tick skipped");
                return TickOutcome::Skipped(SkipReason::Store(e));
            }
        };

        let delta = match self.ctx.sensor.read().await {
            Ok(reading) => {
                debug!(
                    reported_power_w = reading.power_w,
                    frequency_hz = reading.frequency_hz,
                    "sample read"
                );
                self.ctx.integrator.integrate(&reading, self.period)
            }
            Err(e) => Err(e),
        };
        let delta = match delta {
            Ok(delta) => delta,
            Err(e @ SensorError::OverCapacity { .. }) => {
                warn!(error = %e, "over capacity, tick skipped");
                self.ctx.show(DisplayRow::Event, "Over capacity");
                return TickOutcome::Skipped(SkipReason::Sensor(e));
            }
            Err(e) => {
                warn!(error = %e, "no usable sample, tick skipped");
                return TickOutcome::Skipped(SkipReason::Sensor(e));
            }
        };

        let mut ledger = self.carry.restore(stored);
        if ledger.has_credit() {
            ledger.decrement(delta.energy_wh);
            ledger.accumulate_daily(delta.energy_wh);
            match self.ctx.settings.save_energy(&ledger).await {
                Ok(persisted) => self.carry = SubCentCarry::capture(&ledger, &persisted),
                Err(e) => {
                    error!(error = %e, "ledger write failed, tick discarded");
                    return TickOutcome::Skipped(SkipReason::Store(e));
                }
            }
        } else {
            self.carry = SubCentCarry::capture(&ledger, &stored);
        }

        let decision = {
            let mut throttler = self.ctx.throttler.lock();
            policy::evaluate(&ledger, &mut throttler)
        };

        let relay_event = {
            let mut relay = self.ctx.relay.lock();
            let cutoff = if decision.daily_cap_reached && !relay.overrides().forced_off {
                warn!(
                    daily_used_wh = ledger.daily_used_wh,
                    daily_limit_kwh = ledger.daily_limit_kwh,
                    "daily limit reached, forcing supply off"
                );
                relay.force_off()
            } else {
                None
            };
            cutoff.or_else(|| relay.apply(ledger.balance_wh))
        };

        drop(access);

        *self.ctx.last_tick.lock() = Some(LastTick {
            at: Utc::now(),
            power_w: delta.power_w,
            energy_wh: delta.energy_wh,
        });
        self.ctx
            .show(DisplayRow::Status, &status_line(ledger.balance_wh, delta.power_w));
        if let Some(event) = relay_event {
            self.ctx.show(DisplayRow::Event, &event.to_string());
        }
        debug!(
            balance_wh = ledger.balance_wh,
            daily_used_wh = ledger.daily_used_wh,
            power_w = delta.power_w,
            energy_wh = delta.energy_wh,
            "control tick"
        );

        if let Some(alert) = decision.alert {
            info!(%alert, "sending balance alert");
            if let Err(e) = self.ctx.notifier.send(&alert.to_string()).await {
                warn!(error = %e, "balance alert not delivered");
            }
        }

        TickOutcome::Completed(TickReport {
            ledger,
            power_w: delta.power_w,
            energy_wh: delta.energy_wh,
            alert: decision.alert,
            relay_event,
            daily_cap_reached: decision.daily_cap_reached,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Collaborators;
    use crate::config::MeterConfig;
    use crate::domain::{MemoryDisplay, SampleReading, ScriptedSensor, SimulatedRelay};
    use crate::notify::MockNotifier;
    use crate::store::settings::SettingsDefaults;
    use crate::store::{keys, MemoryStore, SettingsStore};

    fn context(store: Arc<MemoryStore>, notifier: MockNotifier) -> Arc<MeterContext> {
        let parts = Collaborators {
            settings: SettingsStore::new(store, SettingsDefaults::default()),
            sensor: Arc::new(ScriptedSensor::steady(SampleReading::new(220.0, 1.0, 1.0))),
            relay: Arc::new(SimulatedRelay::new()),
            notifier: Arc::new(notifier),
            display: Arc::new(MemoryDisplay::new()),
        };
        Arc::new(MeterContext::new(parts, &MeterConfig::default()))
    }

    #[tokio::test]
    async fn low_balance_alert_is_sent_once_for_window() {
        let store = Arc::new(MemoryStore::with_values([(keys::BALANCE_WH, "1000.00")]));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|text: &str| text.starts_with("Credit running low, remaining 0.9 kWh"))
            .times(1)
            .returning(|_| Ok(()));
        let mut control = ControlLoop::new(context(store, notifier));
        for _ in 0..10 {
            assert!(!control.tick().await.is_skipped());
        }
    }

    #[tokio::test]
    async fn failed_alert_does_not_stop_the_tick() {
        let store = Arc::new(MemoryStore::with_values([(keys::BALANCE_WH, "1000.00")]));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .returning(|_| Err(crate::notify::SendError::Transport("offline".to_string())));
        let mut control = ControlLoop::new(context(store.clone(), notifier));
        let outcome = control.tick().await;
        assert!(outcome.report().unwrap().alert.is_some());
        assert_eq!(store.value(keys::BALANCE_WH).as_deref(), Some("999.94"));
    }
}
