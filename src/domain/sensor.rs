use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Sensor-side failures. Any of them skips integration for one tick.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid sample: {0}")]
    InvalidSample(String),
    #[error("Power {power_w:.1}W exceeds installation capacity {capacity_w:.0}W")]
    OverCapacity { power_w: f64, capacity_w: f64 },
}

/// One reading from the power monitor.
///
/// `power_w` and `frequency_hz` are what the monitor reports; billing uses
/// [`active_power_w`](Self::active_power_w) instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleReading {
    pub voltage_v: f64,
    pub current_a: f64,
    pub power_factor: f64,
    pub power_w: f64,
    pub frequency_hz: f64,
}

impl SampleReading {
    pub fn new(voltage_v: f64, current_a: f64, power_factor: f64) -> Self {
        Self {
            voltage_v,
            current_a,
            power_factor,
            power_w: voltage_v * current_a * power_factor,
            frequency_hz: 50.0,
        }
    }

    /// Override the monitor-reported power
    pub fn with_reported_power(mut self, power_w: f64) -> Self {
        self.power_w = power_w;
        self
    }

    pub fn validate(&self) -> Result<(), SensorError> {
        for (name, value) in [("voltage", self.voltage_v), ("current", self.current_a)] {
            if !value.is_finite() || value < 0.0 {
                return Err(SensorError::InvalidSample(format!("{name} = {value}")));
            }
        }
        if !self.power_factor.is_finite() || !(0.0..=1.0).contains(&self.power_factor) {
            return Err(SensorError::InvalidSample(format!(
                "power factor = {}",
                self.power_factor
            )));
        }
        Ok(())
    }

    /// Real power in watts
    pub fn active_power_w(&self) -> f64 {
        self.voltage_v * self.current_a * self.power_factor
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sensor: Send + Sync {
    async fn read(&self) -> Result<SampleReading, SensorError>;
}

/// Replays a scripted queue of readings, then repeats the fallback.
pub struct ScriptedSensor {
    queue: Mutex<VecDeque<SampleReading>>,
    fallback: Mutex<Option<SampleReading>>,
}

impl ScriptedSensor {
    pub fn new(readings: impl IntoIterator<Item = SampleReading>) -> Self {
        Self {
            queue: Mutex::new(readings.into_iter().collect()),
            fallback: Mutex::new(None),
        }
    }

    /// Every read returns `reading`
    pub fn steady(reading: SampleReading) -> Self {
        let sensor = Self::new(Vec::new());
        sensor.set_fallback(Some(reading));
        sensor
    }

    pub fn push(&self, reading: SampleReading) {
        self.queue.lock().push_back(reading);
    }

    /// `None` makes an empty queue read as unavailable.
    pub fn set_fallback(&self, reading: Option<SampleReading>) {
        *self.fallback.lock() = reading;
    }
}

#[async_trait]
impl Sensor for ScriptedSensor {
    async fn read(&self) -> Result<SampleReading, SensorError> {
        if let Some(reading) = self.queue.lock().pop_front() {
            return Ok(reading);
        }
        let fallback = *self.fallback.lock();
        fallback.ok_or_else(|| SensorError::Unavailable("no scripted reading".to_string()))
    }
}

/// Simulated household load with a little jitter on every reading.
#[cfg(feature = "sim")]
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    pub nominal_voltage_v: f64,
    pub load_w: f64,
    pub power_factor: f64,
    /// Relative jitter applied to voltage and current (0.02 = ±2%)
    pub jitter: f64,
}

#[cfg(feature = "sim")]
impl SimulatedSensor {
    pub fn new(load_w: f64) -> Self {
        Self {
            nominal_voltage_v: 220.0,
            load_w,
            power_factor: 0.95,
            jitter: 0.02,
        }
    }

    fn sample(&self) -> SampleReading {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let mut wobble = |value: f64| {
            if self.jitter > 0.0 {
                value * (1.0 + rng.gen_range(-self.jitter..=self.jitter))
            } else {
                value
            }
        };
        let voltage_v = wobble(self.nominal_voltage_v);
        let current_a = wobble(self.load_w / (self.nominal_voltage_v * self.power_factor)).max(0.0);
        SampleReading {
            voltage_v,
            current_a,
            power_factor: self.power_factor,
            power_w: voltage_v * current_a * self.power_factor,
            frequency_hz: wobble(50.0),
        }
    }
}

#[cfg(feature = "sim")]
#[async_trait]
impl Sensor for SimulatedSensor {
    async fn read(&self) -> Result<SampleReading, SensorError> {
        Ok(self.sample())
    }
}
