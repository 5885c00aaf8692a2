use crate::infra::Action;
use crate::sim::{SimulationResult, TurnRecord};
use crate::state::{Env, State};

/// Trait for observing simulation events during a run
pub trait SimObserver: Send {
    /// Called once before the first turn, with the turn-zero state
    fn on_run_start(&mut self, env: &Env, seed: u64, state: &State);

    /// Called when every agent has decided, before the transition is applied
    fn on_actions_selected(&mut self, _state: &State, _actions: &[Action]) {
        // Default implementation does nothing
    }

    /// Called after each transition
    fn on_turn(&mut self, record: &TurnRecord<'_>);

    /// Called when the last turn has been played
    fn on_run_finished(&mut self, result: &SimulationResult);
}
