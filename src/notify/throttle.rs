use std::fmt;

use crate::domain::WH_PER_KWH;

/// Ticks between two low-balance alerts
pub const DEFAULT_THROTTLE_WINDOW: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alert {
    /// Remaining balance, floored to 0.1 kWh
    LowBalance { remaining_kwh: f64 },
    Exhausted,
}

impl Alert {
    pub fn low_balance(balance_wh: f64) -> Self {
        let remaining_kwh = (balance_wh / WH_PER_KWH * 10.0).floor() / 10.0;
        Alert::LowBalance { remaining_kwh }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::LowBalance { remaining_kwh } => write!(
                f,
                "Credit running low, remaining {remaining_kwh:.1} kWh. Please top up."
            ),
            Alert::Exhausted => write!(f, "Credit exhausted, supply has been switched off."),
        }
    }
}

/// Rate limiting for balance alerts, counted in ticks rather than time.
#[derive(Debug, Clone)]
pub struct NotificationThrottler {
    window: u32,
    cycles_since_last_alert: u32,
    exhausted_alert_sent: bool,
}

impl Default for NotificationThrottler {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_WINDOW)
    }
}

impl NotificationThrottler {
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            cycles_since_last_alert: 0,
            exhausted_alert_sent: false,
        }
    }

    /// Advance one tick and return the alert to send, if any.
    ///
    /// While the low-balance condition holds, an alert is due on the first
    /// tick and then once every `window` ticks. At zero balance the due
    /// alert is the exhausted message, sent at most once until credit is
    /// seen again.
    pub fn on_tick(&mut self, balance_wh: f64, low_balance: bool) -> Option<Alert> {
        if balance_wh > 0.0 {
            self.exhausted_alert_sent = false;
        }
        if !low_balance {
            self.cycles_since_last_alert = 0;
            return None;
        }

        let alert = if self.cycles_since_last_alert != 0 {
            None
        } else if balance_wh > 0.0 {
            Some(Alert::low_balance(balance_wh))
        } else if !self.exhausted_alert_sent {
            self.exhausted_alert_sent = true;
            Some(Alert::Exhausted)
        } else {
            None
        };

        self.cycles_since_last_alert += 1;
        if self.cycles_since_last_alert >= self.window {
            self.cycles_since_last_alert = 0;
        }
        alert
    }

    pub fn cycles_since_last_alert(&self) -> u32 {
        self.cycles_since_last_alert
    }

    pub fn exhausted_alert_sent(&self) -> bool {
        self.exhausted_alert_sent
    }

    pub fn window(&self) -> u32 {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_alert_per_window() {
        let mut throttler = NotificationThrottler::new(60);
        let alerts = (0..180)
            .filter_map(|_| throttler.on_tick(3000.0, true))
            .count();
        assert_eq!(alerts, 3);
    }

    #[test]
    fn alert_fires_on_first_low_tick_and_again_after_window() {
        let mut throttler = NotificationThrottler::new(60);
        assert!(throttler.on_tick(3000.0, true).is_some());
        for _ in 1..60 {
            assert!(throttler.on_tick(3000.0, true).is_none());
        }
        assert!(throttler.on_tick(3000.0, true).is_some());
    }

    #[test]
    fn remaining_is_floored_to_one_decimal() {
        assert_eq!(
            Alert::low_balance(4_999.0),
            Alert::LowBalance { remaining_kwh: 4.9 }
        );
        assert_eq!(
            Alert::low_balance(4_999.0).to_string(),
            "Credit running low, remaining 4.9 kWh. Please top up."
        );
    }

    #[test]
    fn exhausted_is_sent_once_per_episode() {
        let mut throttler = NotificationThrottler::new(3);
        let mut exhausted = 0;
        for _ in 0..30 {
            if throttler.on_tick(0.0, true) == Some(Alert::Exhausted) {
                exhausted += 1;
            }
        }
        assert_eq!(exhausted, 1);
        assert!(throttler.exhausted_alert_sent());

        // Credit seen again re-arms the one-shot.
        throttler.on_tick(500.0, true);
        assert!(!throttler.exhausted_alert_sent());
        let mut rearmed = 0;
        for _ in 0..30 {
            if throttler.on_tick(0.0, true) == Some(Alert::Exhausted) {
                rearmed += 1;
            }
        }
        assert_eq!(rearmed, 1);
    }

    #[test]
    fn recovering_resets_the_counter() {
        let mut throttler = NotificationThrottler::new(60);
        assert!(throttler.on_tick(3000.0, true).is_some());
        assert!(throttler.on_tick(3000.0, true).is_none());
        assert!(throttler.on_tick(8000.0, false).is_none());
        assert_eq!(throttler.cycles_since_last_alert(), 0);
        assert!(throttler.on_tick(3000.0, true).is_some());
    }
}
