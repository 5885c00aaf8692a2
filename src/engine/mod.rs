//! Pure multi-agent transition: item effects, conflict-free movement, stochastic spawn.

mod items;
mod movement;

pub use items::{ItemOutcome, apply_item_actions, expire_items, spawn_item};
pub use movement::{ConflictBias, MoveOutcome, resolve_moves};

use rand::Rng;

use crate::infra::{Action, Position};
use crate::state::{Env, State};

/// Result of applying one joint action.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: State,
    pub rewards: Vec<f64>,
    pub appeared: Option<Position>,
}

/// Builds the next snapshot from `state` and a joint action vector.
///
/// Order: PICKUP/CLEAR effects, deadline expiry, movement, then item spawn.
/// `rng` is only drawn from for spawning and biased contention.
pub fn next_state<R: Rng + ?Sized>(
    state: &State,
    actions: &[Action],
    env: &Env,
    rng: &mut R,
    bias: Option<ConflictBias>,
) -> Transition {
    debug_assert_eq!(actions.len(), state.num_agents());
    let turn = state.turn + 1;

    let mut items = apply_item_actions(state, actions, env);
    expire_items(&mut items, turn);

    let moves = resolve_moves(state, actions, env, rng, bias);

    let mut tie_break = state.tie_break.clone();
    let appeared = spawn_item(&mut items.cell_items, &mut tie_break, turn, env, rng);

    let success = actions
        .iter()
        .enumerate()
        .map(|(agent, action)| match action {
            Action::Pickup | Action::Clear => items.success[agent],
            _ => moves.success[agent],
        })
        .collect();

    Transition {
        state: State {
            turn,
            agent_pos: moves.positions,
            agent_items: items.agent_items,
            cell_items: items.cell_items,
            tie_break,
            success,
        },
        rewards: items.rewards,
        appeared,
    }
}
