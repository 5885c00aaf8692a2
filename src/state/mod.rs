mod env;
mod map;
mod world_state;

pub use env::{Algorithm, ConflictPolicy, Env, EnvConfig, EnvError, SearchParams};
pub use map::{Map, Tile};
pub use world_state::State;
