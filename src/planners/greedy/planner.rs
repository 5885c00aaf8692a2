use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use rand::Rng;
use rand::seq::SliceRandom;

use crate::infra::{Action, Position};
use crate::state::{Env, State};

/// One (agent, destination) offer in the auction.
#[derive(Clone, Copy, Debug)]
struct Bid {
    agent: usize,
    target: Position,
    value: f64,
    tie_break: f64,
}

impl Bid {
    /// Descending by value, then agent id, then the target's tie-break value.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .value
            .total_cmp(&self.value)
            .then_with(|| other.agent.cmp(&self.agent))
            .then_with(|| other.tie_break.total_cmp(&self.tie_break))
    }
}

/// Destination won by an agent in the auction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Assignment {
    pub target: Position,
    pub value: f64,
}

/// An agent whose action is fixed while everyone else plans around it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pinned {
    pub agent: usize,
    pub action: Action,
}

/// Auction-style joint action proposer. Also the default policy inside search rollouts.
pub struct GreedyPlanner;

impl GreedyPlanner {
    /// Value of `target` for `agent`: reward reachable there, discounted by distance.
    pub fn evaluate(agent: usize, target: Position, state: &State, env: &Env) -> f64 {
        let dist = 1.0 + env.distance(state.agent_pos[agent], target) as f64;
        if target == env.depot {
            return state.agent_items[agent].len() as f64 * env.clear_reward / dist;
        }
        let takeable = state
            .items_at(&target)
            .len()
            .min(state.capacity_left(agent, env));
        takeable as f64 * env.pickup_reward / dist
    }

    /// Assigns destinations in value order. Returns the assignment per agent and the
    /// order in which agents won theirs; a pinned agent gets no assignment.
    pub fn auction(
        state: &State,
        env: &Env,
        pinned: Option<Pinned>,
    ) -> (Vec<Option<Assignment>>, Vec<usize>) {
        let num_agents = state.num_agents();
        let pinned_agent = pinned.map(|p| p.agent);

        let mut bids = Vec::with_capacity(num_agents * (state.cell_items.len() + 1));
        for agent in (0..num_agents).filter(|&a| Some(a) != pinned_agent) {
            for &cell in state.cell_items.keys() {
                if cell == env.depot {
                    continue;
                }
                bids.push(Bid {
                    agent,
                    target: cell,
                    value: Self::evaluate(agent, cell, state, env),
                    tie_break: state.tie_break_of(&cell),
                });
            }
            bids.push(Bid {
                agent,
                target: env.depot,
                value: Self::evaluate(agent, env.depot, state, env),
                tie_break: state.tie_break_of(&env.depot),
            });
        }
        bids.sort_by(Bid::rank);

        let mut reserved: HashMap<Position, usize> = HashMap::new();
        if let Some(Pinned {
            agent,
            action: Action::Pickup,
        }) = pinned
        {
            let pos = state.agent_pos[agent];
            if !state.items_at(&pos).is_empty() {
                *reserved.entry(pos).or_default() += 1;
            }
        }

        let mut assignments = vec![None; num_agents];
        let mut order = Vec::with_capacity(num_agents);
        for bid in bids {
            if assignments[bid.agent].is_some() {
                continue;
            }
            if bid.target != env.depot {
                let taken = reserved.entry(bid.target).or_default();
                if *taken >= state.items_at(&bid.target).len() {
                    continue;
                }
                *taken += 1;
            }
            assignments[bid.agent] = Some(Assignment {
                target: bid.target,
                value: bid.value,
            });
            order.push(bid.agent);
        }

        (assignments, order)
    }

    /// Joint action proposal.
    pub fn propose<R: Rng + ?Sized>(
        state: &State,
        env: &Env,
        rng: &mut R,
        pinned: Option<Pinned>,
    ) -> Vec<Action> {
        Self::propose_with_fallbacks(state, env, rng, pinned)
            .into_iter()
            .map(|ranked| ranked[0])
            .collect()
    }

    /// Per agent, the chosen action followed by the remaining equally useful moves.
    ///
    /// `propose` keeps only the head of each list; the tails are there for callers that
    /// re-plan when the first choice turns out blocked.
    pub fn propose_with_fallbacks<R: Rng + ?Sized>(
        state: &State,
        env: &Env,
        rng: &mut R,
        pinned: Option<Pinned>,
    ) -> Vec<Vec<Action>> {
        let num_agents = state.num_agents();
        let (assignments, order) = Self::auction(state, env, pinned);

        let mut ranked: Vec<Vec<Action>> = vec![Vec::new(); num_agents];
        let mut claimed: HashSet<Position> = HashSet::new();

        if let Some(Pinned { agent, action }) = pinned {
            let next = env.next_pos(state.agent_pos[agent], action);
            if next != env.depot {
                claimed.insert(next);
            }
            ranked[agent] = vec![action];
        }

        for agent in order {
            let Some(assignment) = assignments[agent] else {
                continue;
            };
            let pos = state.agent_pos[agent];
            let choices = Self::choices(pos, assignment, &claimed, env, rng);
            assert!(
                !choices.is_empty(),
                "no legal move for agent {agent} at ({}, {})",
                pos.x,
                pos.y
            );

            let next = env.next_pos(pos, choices[0]);
            if next != env.depot {
                claimed.insert(next);
            }
            tracing::trace!(agent, target = ?assignment.target, value = assignment.value, action = ?choices[0], "Greedy choice");
            ranked[agent] = choices;
        }

        ranked
    }

    fn choices<R: Rng + ?Sized>(
        pos: Position,
        assignment: Assignment,
        claimed: &HashSet<Position>,
        env: &Env,
        rng: &mut R,
    ) -> Vec<Action> {
        let Assignment { target, value } = assignment;
        if value <= 0.0 {
            let mut moves = env.valid_moves(pos).to_vec();
            moves.shuffle(rng);
            return moves;
        }

        if pos == target {
            return vec![if target == env.depot {
                Action::Clear
            } else {
                Action::Pickup
            }];
        }

        let remaining = env.distance(pos, target);
        let (mut free, mut contested): (Vec<Action>, Vec<Action>) = env
            .valid_moves(pos)
            .iter()
            .copied()
            .filter(|&action| env.distance(env.next_pos(pos, action), target) < remaining)
            .partition(|&action| !claimed.contains(&env.next_pos(pos, action)));
        free.shuffle(rng);
        contested.shuffle(rng);
        free.extend(contested);
        free
    }
}
