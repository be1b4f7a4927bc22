pub mod display;
pub mod integrator;
pub mod ledger;
pub mod relay;
pub mod sensor;

pub use display::*;
pub use integrator::*;
pub use ledger::*;
pub use relay::*;
pub use sensor::*;
