use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Watt-hours per kilowatt-hour
pub const WH_PER_KWH: f64 = 1000.0;

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("Top-up amount must be a positive number of kWh, got {0}")]
    InvalidAmount(f64),
    #[error("Top-up of {amount_kwh} kWh would overflow the balance")]
    Overflow { amount_kwh: f64 },
}

/// Prepaid credit ledger.
///
/// Balances and the daily accumulator are kept in watt-hours, limits and
/// thresholds in kilowatt-hours as they are entered by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreditLedger {
    pub balance_wh: f64,
    pub daily_used_wh: f64,
    pub daily_limit_kwh: f64,
    pub low_balance_threshold_kwh: f64,
    pub tariff_rate_per_kwh: f64,
}

impl CreditLedger {
    /// Subtract consumed energy, clamping at zero.
    pub fn decrement(&mut self, amount_wh: f64) {
        if !amount_wh.is_finite() || amount_wh <= 0.0 {
            return;
        }
        self.balance_wh = (self.balance_wh - amount_wh).max(0.0);
    }

    /// Credit a purchased amount of energy. Callers hold the top-up guard.
    /// The balance is left alone when the amount or the result is not a
    /// usable number.
    pub fn top_up(&mut self, amount_kwh: f64) -> Result<(), LedgerError> {
        if !amount_kwh.is_finite() || amount_kwh <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount_kwh));
        }
        let balance_wh = self.balance_wh.max(0.0) + amount_kwh * WH_PER_KWH;
        if !balance_wh.is_finite() {
            return Err(LedgerError::Overflow { amount_kwh });
        }
        self.balance_wh = balance_wh;
        Ok(())
    }

    pub fn accumulate_daily(&mut self, amount_wh: f64) {
        if amount_wh.is_finite() && amount_wh > 0.0 {
            self.daily_used_wh += amount_wh;
        }
    }

    pub fn has_credit(&self) -> bool {
        self.balance_wh > 0.0
    }

    pub fn balance_kwh(&self) -> f64 {
        self.balance_wh / WH_PER_KWH
    }

    /// Balance below the configured low-balance threshold
    pub fn is_low_balance(&self) -> bool {
        self.balance_kwh() < self.low_balance_threshold_kwh
    }

    /// A non-positive daily limit disables the cap.
    pub fn daily_cap_reached(&self) -> bool {
        self.daily_limit_kwh > 0.0 && self.daily_used_wh >= self.daily_limit_kwh * WH_PER_KWH
    }

    /// Monetary value of the remaining balance at the current tariff
    pub fn balance_value(&self) -> f64 {
        self.balance_kwh() * self.tariff_rate_per_kwh
    }
}

/// Text form used for every persisted energy value: two decimal places.
pub fn format_energy(value: f64) -> String {
    format!("{value:.2}")
}

/// The value a reader gets back after `value` went through [`format_energy`].
pub fn persisted_energy(value: f64) -> f64 {
    format_energy(value).parse().unwrap_or(value)
}

/// Energy below the 0.01 Wh resolution of the persisted text.
///
/// The control loop keeps the difference between its exact ledger and what
/// the store holds, and folds it back in on the next tick. Without it a
/// small load (anything under 18 W at one tick per second) would round back
/// to the stored value forever and never be billed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubCentCarry {
    balance_wh: f64,
    daily_used_wh: f64,
}

impl SubCentCarry {
    pub fn capture(exact: &CreditLedger, persisted: &CreditLedger) -> Self {
        Self {
            balance_wh: exact.balance_wh - persisted.balance_wh,
            daily_used_wh: exact.daily_used_wh - persisted.daily_used_wh,
        }
    }

    /// Reapply the carry to a ledger freshly loaded from the store.
    ///
    /// A stored balance of zero means the ledger was exhausted or reset, so
    /// the balance carry is dropped.
    pub fn restore(&self, stored: CreditLedger) -> CreditLedger {
        let mut ledger = stored;
        if stored.balance_wh > 0.0 {
            ledger.balance_wh = (stored.balance_wh + self.balance_wh).max(0.0);
        }
        ledger.daily_used_wh = (stored.daily_used_wh + self.daily_used_wh).max(0.0);
        ledger
    }

    pub fn balance_wh(&self) -> f64 {
        self.balance_wh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn ledger(balance_wh: f64) -> CreditLedger {
        CreditLedger {
            balance_wh,
            daily_used_wh: 0.0,
            daily_limit_kwh: 10.0,
            low_balance_threshold_kwh: 5.0,
            tariff_rate_per_kwh: 1444.70,
        }
    }

    #[test]
    fn decrement_clamps_at_zero() {
        let mut l = ledger(0.5);
        l.decrement(2.0);
        assert_eq!(l.balance_wh, 0.0);
        l.decrement(2.0);
        assert_eq!(l.balance_wh, 0.0);
    }

    #[test]
    fn decrement_ignores_garbage_amounts() {
        let mut l = ledger(100.0);
        l.decrement(f64::NAN);
        l.decrement(-5.0);
        l.decrement(f64::INFINITY);
        assert_eq!(l.balance_wh, 100.0);
    }

    #[test]
    fn top_up_converts_kwh() {
        let mut l = ledger(0.0);
        l.top_up(2.0).unwrap();
        assert_eq!(l.balance_wh, 2000.0);
        l.top_up(0.5).unwrap();
        assert_eq!(l.balance_wh, 2500.0);
    }

    #[rstest]
    #[case(0.0, LedgerError::InvalidAmount(0.0))]
    #[case(-1.0, LedgerError::InvalidAmount(-1.0))]
    #[case(f64::INFINITY, LedgerError::InvalidAmount(f64::INFINITY))]
    #[case(1e306, LedgerError::Overflow { amount_kwh: 1e306 })]
    fn top_up_refuses_unusable_amounts(#[case] amount_kwh: f64, #[case] expected: LedgerError) {
        let mut l = ledger(500.0);
        assert_eq!(l.top_up(amount_kwh), Err(expected));
        assert_eq!(l.balance_wh, 500.0);
    }

    #[rstest]
    #[case(4999.0, true)]
    #[case(5000.0, false)]
    #[case(0.0, true)]
    fn low_balance_threshold(#[case] balance_wh: f64, #[case] low: bool) {
        assert_eq!(ledger(balance_wh).is_low_balance(), low);
    }

    #[rstest]
    #[case(10.0, 9999.99, false)]
    #[case(10.0, 10000.0, true)]
    #[case(0.0, 50000.0, false)]
    fn daily_cap(#[case] limit_kwh: f64, #[case] used_wh: f64, #[case] reached: bool) {
        let mut l = ledger(100.0);
        l.daily_limit_kwh = limit_kwh;
        l.daily_used_wh = used_wh;
        assert_eq!(l.daily_cap_reached(), reached);
    }

    #[test]
    fn energy_text_has_two_decimals() {
        assert_eq!(format_energy(4999.938_888), "4999.94");
        assert_eq!(format_energy(0.0), "0.00");
        assert_eq!(persisted_energy(12.344), 12.34);
    }

    #[test]
    fn carry_keeps_small_loads_billed() {
        // 10 W for one second is 0.00278 Wh, far below the stored resolution.
        let per_tick = 10.0 / 3600.0;
        let mut carry = SubCentCarry::default();
        let mut stored = ledger(1000.0);
        for _ in 0..3600 {
            let mut exact = carry.restore(stored);
            exact.decrement(per_tick);
            exact.accumulate_daily(per_tick);
            let mut persisted = exact;
            persisted.balance_wh = persisted_energy(exact.balance_wh);
            persisted.daily_used_wh = persisted_energy(exact.daily_used_wh);
            carry = SubCentCarry::capture(&exact, &persisted);
            stored = persisted;
        }
        assert!((stored.balance_wh - 990.0).abs() < 0.011);
        assert!((stored.daily_used_wh - 10.0).abs() < 0.011);
    }

    #[test]
    fn carry_is_dropped_after_reset() {
        let carry = SubCentCarry {
            balance_wh: 0.004,
            daily_used_wh: 0.0,
        };
        assert_eq!(carry.restore(ledger(0.0)).balance_wh, 0.0);
    }

    proptest! {
        #[test]
        fn balance_never_negative(
            start in 0.0f64..10_000.0,
            steps in proptest::collection::vec(-10.0f64..5_000.0, 0..64),
        ) {
            let mut l = ledger(start);
            for step in steps {
                l.decrement(step);
                prop_assert!(l.balance_wh >= 0.0);
            }
        }

        #[test]
        fn daily_usage_is_monotonic(steps in proptest::collection::vec(-1.0f64..100.0, 0..64)) {
            let mut l = ledger(1.0);
            let mut last = l.daily_used_wh;
            for step in steps {
                l.accumulate_daily(step);
                prop_assert!(l.daily_used_wh >= last);
                last = l.daily_used_wh;
            }
        }
    }
}
