use crate::domain::CreditLedger;
use crate::notify::{Alert, NotificationThrottler};

/// What the thresholds call for after one tick's accounting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyDecision {
    pub low_balance: bool,
    pub alert: Option<Alert>,
    /// Supply must be forced off regardless of balance
    pub daily_cap_reached: bool,
}

pub fn evaluate(ledger: &CreditLedger, throttler: &mut NotificationThrottler) -> PolicyDecision {
    let low_balance = ledger.is_low_balance();
    let alert = throttler.on_tick(ledger.balance_wh, low_balance);
    PolicyDecision {
        low_balance,
        alert,
        daily_cap_reached: ledger.daily_cap_reached(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(balance_wh: f64, daily_used_wh: f64) -> CreditLedger {
        CreditLedger {
            balance_wh,
            daily_used_wh,
            daily_limit_kwh: 2.0,
            low_balance_threshold_kwh: 5.0,
            tariff_rate_per_kwh: 1444.70,
        }
    }

    #[test]
    fn healthy_balance_needs_nothing() {
        let mut throttler = NotificationThrottler::default();
        let decision = evaluate(&ledger(8000.0, 10.0), &mut throttler);
        assert_eq!(
            decision,
            PolicyDecision {
                low_balance: false,
                alert: None,
                daily_cap_reached: false
            }
        );
    }

    #[test]
    fn low_balance_alerts_with_remaining_credit() {
        let mut throttler = NotificationThrottler::default();
        let decision = evaluate(&ledger(4321.0, 0.0), &mut throttler);
        assert!(decision.low_balance);
        assert_eq!(decision.alert, Some(Alert::LowBalance { remaining_kwh: 4.3 }));
    }

    #[test]
    fn daily_cap_is_independent_of_balance() {
        let mut throttler = NotificationThrottler::default();
        let decision = evaluate(&ledger(9000.0, 2000.0), &mut throttler);
        assert!(decision.daily_cap_reached);
        assert!(decision.alert.is_none());
    }
}
