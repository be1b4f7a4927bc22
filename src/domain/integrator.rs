use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::sensor::{SampleReading, SensorError};

/// Mid-tier residential connection rating (VA)
pub const DEFAULT_CAPACITY_W: f64 = 1100.0;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// How much time one control tick is billed for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IntegrationInterval {
    /// Every tick bills one second of consumption, whatever the sampling
    /// period is. This is how deployed meters have always billed.
    #[default]
    Nominal,
    /// Every tick bills the configured sampling period.
    Elapsed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyDelta {
    pub power_w: f64,
    pub energy_wh: f64,
}

#[derive(Debug, Clone)]
pub struct EnergyIntegrator {
    pub capacity_w: f64,
    pub interval: IntegrationInterval,
}

impl Default for EnergyIntegrator {
    fn default() -> Self {
        Self {
            capacity_w: DEFAULT_CAPACITY_W,
            interval: IntegrationInterval::Nominal,
        }
    }
}

impl EnergyIntegrator {
    pub fn new(capacity_w: f64, interval: IntegrationInterval) -> Self {
        Self {
            capacity_w,
            interval,
        }
    }

    /// Energy consumed during one tick.
    ///
    /// Fails with [`SensorError::OverCapacity`] when the draw exceeds the
    /// installation rating; the tick must then leave ledger and relay alone.
    pub fn integrate(
        &self,
        reading: &SampleReading,
        sampling_period: Duration,
    ) -> Result<EnergyDelta, SensorError> {
        reading.validate()?;
        let power_w = reading.active_power_w();
        if power_w > self.capacity_w {
            return Err(SensorError::OverCapacity {
                power_w,
                capacity_w: self.capacity_w,
            });
        }
        let seconds = match self.interval {
            IntegrationInterval::Nominal => 1.0,
            IntegrationInterval::Elapsed => sampling_period.as_secs_f64(),
        };
        Ok(EnergyDelta {
            power_w,
            energy_wh: power_w * seconds / SECONDS_PER_HOUR,
        })
    }
}
