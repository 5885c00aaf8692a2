use std::io::{self, Write};

use tracing::{debug, info};

use crate::infra::{Action, SimObserver};
use crate::sim::{SimulationResult, Snapshot, TurnRecord};
use crate::state::{Env, State};

fn action_names(actions: &[Action]) -> Vec<&'static str> {
    actions.iter().map(|action| action.as_str()).collect()
}

/// Logs run progress through `tracing`.
pub struct DefaultObserver;

impl SimObserver for DefaultObserver {
    fn on_run_start(&mut self, env: &Env, seed: u64, _state: &State) {
        info!("Run of {} started", env.name);
        info!("- seed: {}", seed);
        info!("- agents: {}, turns: {}", env.num_agents, env.last_turn);
        info!("- map size: {}x{}", env.map.width, env.map.height);
    }

    fn on_actions_selected(&mut self, state: &State, actions: &[Action]) {
        debug!(turn = state.turn, actions = ?action_names(actions), "Actions selected");
    }

    fn on_turn(&mut self, record: &TurnRecord<'_>) {
        if let Some(pos) = record.appeared {
            debug!(turn = record.state.turn, x = pos.x, y = pos.y, "New item");
        }
        debug!(
            turn = record.state.turn,
            rewards = ?record.rewards,
            success = ?record.state.success,
            "Turn played"
        );
    }

    fn on_run_finished(&mut self, result: &SimulationResult) {
        info!(
            env = %result.env_name,
            seed = result.seed,
            items = result.total_items,
            delivered = result.delivered_items,
            seconds = result.process_time,
            "Run finished"
        );
    }
}

/// Prints a text snapshot of the floor before the first turn and after every turn,
/// on top of the regular logging.
pub struct VerboseObserver {
    inner: DefaultObserver,
}

impl VerboseObserver {
    pub fn new() -> Self {
        Self {
            inner: DefaultObserver,
        }
    }
}

impl Default for VerboseObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimObserver for VerboseObserver {
    fn on_run_start(&mut self, env: &Env, seed: u64, state: &State) {
        self.inner.on_run_start(env, seed, state);
        let _ = writeln!(io::stdout(), "{}", Snapshot::initial(env, state));
    }

    fn on_actions_selected(&mut self, state: &State, actions: &[Action]) {
        self.inner.on_actions_selected(state, actions);
    }

    fn on_turn(&mut self, record: &TurnRecord<'_>) {
        self.inner.on_turn(record);
        let _ = writeln!(io::stdout(), "{}", record.snapshot());
    }

    fn on_run_finished(&mut self, result: &SimulationResult) {
        self.inner.on_run_finished(result);
    }
}
