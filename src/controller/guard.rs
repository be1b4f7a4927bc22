//! Exclusive access to the credit ledger.
//!
//! The control loop and the command path both read-modify-write the
//! persisted ledger. Whoever holds an [`ExclusiveAccess`] token is the only
//! writer; the token is released by dropping it. The control loop only ever
//! *tries* to take the token and skips its tick when a command holds it,
//! while commands wait for the loop to finish its current tick.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GuardIntent {
    ControlTick,
    ToppingUp,
    ResettingToZero,
    UpdatingSettings,
    ShuttingDown,
}

/// Which command intent currently holds the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GuardFlags {
    pub topping_up: bool,
    pub resetting_to_zero: bool,
    pub updating_settings: bool,
    pub shutting_down: bool,
}

impl GuardFlags {
    pub fn any(&self) -> bool {
        self.topping_up || self.resetting_to_zero || self.updating_settings || self.shutting_down
    }
}

#[derive(Debug, Default)]
pub struct LedgerGuard {
    lock: Arc<AsyncMutex<()>>,
    holder: Arc<Mutex<Option<GuardIntent>>>,
}

impl LedgerGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the token if nobody holds it.
    pub fn try_acquire(&self, intent: GuardIntent) -> Option<ExclusiveAccess> {
        let permit = self.lock.clone().try_lock_owned().ok()?;
        Some(self.grant(intent, permit))
    }

    /// Wait for the token. Holders never keep it for longer than one tick
    /// plus the settle delay, except at shutdown.
    pub async fn acquire(&self, intent: GuardIntent) -> ExclusiveAccess {
        let permit = self.lock.clone().lock_owned().await;
        self.grant(intent, permit)
    }

    pub fn holder(&self) -> Option<GuardIntent> {
        *self.holder.lock()
    }

    pub fn flags(&self) -> GuardFlags {
        let holder = self.holder();
        GuardFlags {
            topping_up: holder == Some(GuardIntent::ToppingUp),
            resetting_to_zero: holder == Some(GuardIntent::ResettingToZero),
            updating_settings: holder == Some(GuardIntent::UpdatingSettings),
            shutting_down: holder == Some(GuardIntent::ShuttingDown),
        }
    }

    fn grant(&self, intent: GuardIntent, permit: OwnedMutexGuard<()>) -> ExclusiveAccess {
        *self.holder.lock() = Some(intent);
        ExclusiveAccess {
            intent,
            holder: self.holder.clone(),
            _permit: permit,
        }
    }
}

/// Proof of exclusive ledger access. Dropping it releases the ledger.
#[derive(Debug)]
pub struct ExclusiveAccess {
    intent: GuardIntent,
    holder: Arc<Mutex<Option<GuardIntent>>>,
    _permit: OwnedMutexGuard<()>,
}

impl ExclusiveAccess {
    pub fn intent(&self) -> GuardIntent {
        self.intent
    }
}

impl Drop for ExclusiveAccess {
    fn drop(&mut self) {
        *self.holder.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn try_acquire_fails_while_held() {
        let guard = LedgerGuard::new();
        let access = guard.try_acquire(GuardIntent::ToppingUp).unwrap();
        assert_eq!(access.intent(), GuardIntent::ToppingUp);
        assert!(guard.flags().topping_up);
        assert!(guard.try_acquire(GuardIntent::ControlTick).is_none());

        drop(access);
        assert!(!guard.flags().any());
        assert!(guard.try_acquire(GuardIntent::ControlTick).is_some());
    }

    #[test]
    fn control_tick_is_not_a_command_flag() {
        let guard = LedgerGuard::new();
        let _tick = guard.try_acquire(GuardIntent::ControlTick).unwrap();
        assert!(!guard.flags().any());
        assert_eq!(guard.holder(), Some(GuardIntent::ControlTick));
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let guard = Arc::new(LedgerGuard::new());
        let tick = guard.try_acquire(GuardIntent::ControlTick).unwrap();

        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move {
                let access = guard.acquire(GuardIntent::ResettingToZero).await;
                access.intent()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(tick);
        assert_eq!(waiter.await.unwrap(), GuardIntent::ResettingToZero);
    }
}
