mod default_observer;
mod pathfinding;
mod sim_observer;
mod types;

pub use default_observer::{DefaultObserver, VerboseObserver};
pub use pathfinding::{DistanceTable, UNREACHABLE};
pub use sim_observer::SimObserver;
pub use types::{Action, Position};
