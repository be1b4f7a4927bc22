pub mod factory;

use serde::{Deserialize, Serialize};

pub use factory::DeviceFactory;

/// Which devices the meter is wired to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HardwareMode {
    /// Jittered simulated load, simulated relay, file-backed store.
    /// Needs the `sim` feature; without it the factory falls back to mock.
    #[default]
    Simulated,
    /// Steady scripted load and an in-memory store. Nothing survives a restart.
    Mock,
}
