use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::domain::RelayActuator;

/// Manual relay states set from the command path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayOverride {
    pub forced_on: bool,
    pub forced_off: bool,
}

impl RelayOverride {
    pub fn active(&self) -> bool {
        self.forced_on || self.forced_off
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEvent {
    SwitchedOn,
    SwitchedOff,
}

impl fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayEvent::SwitchedOn => write!(f, "Relay ON"),
            RelayEvent::SwitchedOff => write!(f, "Relay OFF"),
        }
    }
}

/// Supply relay follows the sign of the balance unless overridden.
pub struct RelayController {
    actuator: Arc<dyn RelayActuator>,
    overrides: RelayOverride,
    /// Last level written, used to report edges only
    output: Option<bool>,
}

impl RelayController {
    pub fn new(actuator: Arc<dyn RelayActuator>) -> Self {
        Self {
            actuator,
            overrides: RelayOverride::default(),
            output: None,
        }
    }

    /// Automatic control for one tick. Returns an event on a level change.
    pub fn apply(&mut self, balance_wh: f64) -> Option<RelayEvent> {
        if self.overrides.active() {
            return None;
        }
        self.drive(balance_wh > 0.0)
    }

    pub fn force_on(&mut self) -> Option<RelayEvent> {
        self.overrides = RelayOverride {
            forced_on: true,
            forced_off: false,
        };
        self.drive(true)
    }

    pub fn force_off(&mut self) -> Option<RelayEvent> {
        self.overrides = RelayOverride {
            forced_on: false,
            forced_off: true,
        };
        self.drive(false)
    }

    /// Hand the relay back to automatic control from the next tick on.
    pub fn release(&mut self) {
        self.overrides = RelayOverride::default();
    }

    pub fn overrides(&self) -> RelayOverride {
        self.overrides
    }

    pub fn output(&self) -> Option<bool> {
        self.output
    }

    fn drive(&mut self, on: bool) -> Option<RelayEvent> {
        self.actuator.set_output(on);
        if self.output == Some(on) {
            return None;
        }
        self.output = Some(on);
        let event = if on {
            RelayEvent::SwitchedOn
        } else {
            RelayEvent::SwitchedOff
        };
        info!(%event, "relay switched");
        Some(event)
    }
}
