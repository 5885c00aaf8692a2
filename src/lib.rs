pub mod engine;
pub mod infra;
pub mod planners;
pub mod sim;
pub mod state;

// Re-export commonly used types for convenience
pub use infra::{Action, DefaultObserver, Position, SimObserver, VerboseObserver};
pub use sim::{SimError, SimulationResult, Simulator};
pub use state::{Env, EnvError, State};
