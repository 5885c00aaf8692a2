use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::infra::{Action, Position};
use crate::state::{Env, State};

/// Item-side result of one turn: carried and waiting items, per-agent success and reward.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub agent_items: Vec<Vec<u32>>,
    pub cell_items: BTreeMap<Position, Vec<u32>>,
    pub success: Vec<bool>,
    pub rewards: Vec<f64>,
}

/// Applies PICKUP and CLEAR for every agent in id order.
///
/// Every success pays its reward to all agents; the actor also gets `diy_bonus`.
pub fn apply_item_actions(state: &State, actions: &[Action], env: &Env) -> ItemOutcome {
    let num_agents = state.num_agents();
    let mut agent_items = state.agent_items.clone();
    let mut cell_items = state.cell_items.clone();
    let mut success = vec![false; num_agents];
    let mut rewards = vec![0.0; num_agents];

    for (agent, &action) in actions.iter().enumerate() {
        let pos = state.agent_pos[agent];
        match action {
            Action::Pickup => {
                if agent_items[agent].len() >= env.max_items {
                    continue;
                }
                let Some(waiting) = cell_items.get_mut(&pos) else {
                    continue;
                };
                if waiting.is_empty() {
                    continue;
                }
                let deadline = waiting.remove(0);
                if waiting.is_empty() {
                    cell_items.remove(&pos);
                }
                insert_sorted(&mut agent_items[agent], deadline);

                for reward in rewards.iter_mut() {
                    *reward += env.pickup_reward;
                }
                rewards[agent] += env.diy_bonus;
                success[agent] = true;
                tracing::trace!(agent, deadline, ?pos, "Pickup");
            }
            Action::Clear => {
                let carried = agent_items[agent].len();
                if pos != env.depot || carried == 0 {
                    continue;
                }
                agent_items[agent].clear();

                let count = carried as f64;
                for reward in rewards.iter_mut() {
                    *reward += env.clear_reward * count;
                }
                rewards[agent] += env.diy_bonus * count;
                success[agent] = true;
                tracing::trace!(agent, carried, "Clear");
            }
            _ => {}
        }
    }

    ItemOutcome {
        agent_items,
        cell_items,
        success,
        rewards,
    }
}

/// Inserts `deadline` keeping `items` ascending.
fn insert_sorted(items: &mut Vec<u32>, deadline: u32) {
    let at = items.partition_point(|&d| d <= deadline);
    items.insert(at, deadline);
}

/// Drops every carried or waiting item whose deadline is at or before `turn`.
pub fn expire_items(outcome: &mut ItemOutcome, turn: u32) {
    for items in outcome.agent_items.iter_mut() {
        let expired = items.partition_point(|&d| d <= turn);
        items.drain(..expired);
    }
    outcome.cell_items.retain(|_, items| {
        let expired = items.partition_point(|&d| d <= turn);
        items.drain(..expired);
        !items.is_empty()
    });
}

/// With probability `appear_prob`, places a new item on a uniformly chosen spawn cell.
///
/// The deadline is `turn + time_limit`, where `turn` is the turn being entered.
pub fn spawn_item<R: Rng + ?Sized>(
    cell_items: &mut BTreeMap<Position, Vec<u32>>,
    tie_break: &mut Arc<HashMap<Position, f64>>,
    turn: u32,
    env: &Env,
    rng: &mut R,
) -> Option<Position> {
    if !rng.random_bool(env.appear_prob) {
        return None;
    }
    let pos = *env.spawn_cells.choose(rng)?;
    let deadline = turn + env.time_limit;

    let waiting = cell_items.entry(pos).or_default();
    debug_assert!(waiting.last().is_none_or(|&last| last <= deadline));
    waiting.push(deadline);

    if !tie_break.contains_key(&pos) {
        let value = rng.random::<f64>();
        Arc::make_mut(tie_break).insert(pos, value);
    }

    tracing::trace!(?pos, deadline, "Item appeared");
    Some(pos)
}
