use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Output pin driving the supply contactor
#[cfg_attr(test, mockall::automock)]
pub trait RelayActuator: Send + Sync {
    fn set_output(&self, on: bool);
}

/// Relay that only remembers its line level.
#[derive(Debug, Default)]
pub struct SimulatedRelay {
    level: AtomicBool,
    writes: AtomicU64,
}

impl SimulatedRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl RelayActuator for SimulatedRelay {
    fn set_output(&self, on: bool) {
        self.level.store(on, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(on, "relay line written");
    }
}
