//! Turn loop, run summary and text snapshots.

mod result;
mod simulator;
mod snapshot;

pub use result::SimulationResult;
pub use simulator::{SimError, Simulator, TurnRecord};
pub use snapshot::Snapshot;
