use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::infra::Position;
use crate::state::Env;

/// Immutable snapshot of one simulation turn.
///
/// Transitions always build a new `State`; planners share the current one by
/// reference. Deadline lists are kept in ascending order (soonest first).
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    pub turn: u32,
    pub agent_pos: Vec<Position>,
    pub agent_items: Vec<Vec<u32>>,
    pub cell_items: BTreeMap<Position, Vec<u32>>,
    /// Stable per-cell sort key, assigned the first time an item appears on a cell.
    pub tie_break: Arc<HashMap<Position, f64>>,
    pub success: Vec<bool>,
}

impl State {
    pub fn new(
        turn: u32,
        agent_pos: Vec<Position>,
        agent_items: Vec<Vec<u32>>,
        cell_items: BTreeMap<Position, Vec<u32>>,
        tie_break: Arc<HashMap<Position, f64>>,
    ) -> Self {
        let success = vec![true; agent_pos.len()];
        Self {
            turn,
            agent_pos,
            agent_items,
            cell_items,
            tie_break,
            success,
        }
    }

    /// Turn-zero state: agents on distinct random cells, nothing carried, no items.
    pub fn initial<R: Rng + ?Sized>(env: &Env, rng: &mut R) -> Self {
        let starts: Vec<Position> = env
            .spawn_cells
            .iter()
            .filter(|&&pos| pos != env.depot)
            .copied()
            .collect();
        let agent_pos: Vec<Position> = starts
            .choose_multiple(rng, env.num_agents)
            .copied()
            .collect();

        let mut tie_break = HashMap::new();
        tie_break.insert(env.depot, rng.random::<f64>());

        Self::new(
            0,
            agent_pos,
            vec![Vec::new(); env.num_agents],
            BTreeMap::new(),
            Arc::new(tie_break),
        )
    }

    pub fn num_agents(&self) -> usize {
        self.agent_pos.len()
    }

    /// Items waiting on `pos`.
    pub fn items_at(&self, pos: &Position) -> &[u32] {
        self.cell_items.get(pos).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tie_break_of(&self, pos: &Position) -> f64 {
        self.tie_break.get(pos).copied().unwrap_or(0.0)
    }

    /// Soonest deadline carried by `agent`, or `u32::MAX` when empty-handed.
    pub fn earliest_deadline(&self, agent: usize) -> u32 {
        self.agent_items[agent].first().copied().unwrap_or(u32::MAX)
    }

    pub fn capacity_left(&self, agent: usize, env: &Env) -> usize {
        env.max_items.saturating_sub(self.agent_items[agent].len())
    }

    pub fn can_pickup(&self, agent: usize, env: &Env) -> bool {
        self.capacity_left(agent, env) > 0 && !self.items_at(&self.agent_pos[agent]).is_empty()
    }

    pub fn can_clear(&self, agent: usize, env: &Env) -> bool {
        self.agent_pos[agent] == env.depot && !self.agent_items[agent].is_empty()
    }

    pub fn is_finished(&self, env: &Env) -> bool {
        self.turn >= env.last_turn
    }
}
