use rand::Rng;
use rand::seq::IndexedRandom;

use crate::engine::{ConflictBias, next_state};
use crate::infra::Action;
use crate::planners::greedy::{GreedyPlanner, Pinned};
use crate::planners::mcts::tree::{NodeId, SearchTree};
use crate::state::{Env, State};

// Optimism adjustment after the previous turn's own action succeeded or failed
const OPTIMISM_GROWTH: f64 = 1.5;
const OPTIMISM_DECAY: f64 = 0.5;

/// Actions worth considering for `agent`: real moves, plus PICKUP and CLEAR when they
/// would succeed.
pub fn valid_actions(agent: usize, state: &State, env: &Env) -> Vec<Action> {
    let mut actions = env.valid_moves(state.agent_pos[agent]).to_vec();
    if state.can_pickup(agent, env) {
        actions.push(Action::Pickup);
    }
    if state.can_clear(agent, env) {
        actions.push(Action::Clear);
    }
    actions
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchOutcome {
    pub action: Action,
    /// Optimism level to carry into the next turn.
    pub optimism: f64,
    /// Nodes in the tree when the search finished.
    pub nodes: usize,
}

/// Single-agent Monte-Carlo tree search over the joint transition, with the other
/// agents following the greedy planner.
#[derive(Clone, Copy, Debug)]
pub struct MctsPlanner {
    agent: usize,
    optimistic: bool,
}

impl MctsPlanner {
    pub fn new(agent: usize, optimistic: bool) -> Self {
        Self { agent, optimistic }
    }

    /// Optimism level used for this turn, given the level carried from the last one.
    pub fn next_optimism(&self, root: &State, optimism: f64) -> f64 {
        if !self.optimistic {
            return optimism;
        }
        if root.success[self.agent] {
            (optimism * OPTIMISM_GROWTH).min(1.0)
        } else {
            optimism * OPTIMISM_DECAY
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(agent = self.agent, turn = root.turn))]
    pub fn search<R: Rng + ?Sized>(
        &self,
        root: &State,
        env: &Env,
        rng: &mut R,
        optimism: f64,
    ) -> SearchOutcome {
        let optimism = self.next_optimism(root, optimism);
        let bias = self.optimistic.then_some(ConflictBias {
            agent: self.agent,
            win_prob: optimism,
        });

        let mut search = Search {
            agent: self.agent,
            env,
            rng,
            bias,
            tree: SearchTree::new(root.clone(), env.search.expand_threshold),
        };
        for _ in 0..env.search.iterations {
            search.simulate(SearchTree::ROOT, 1);
        }
        let action = search.decide();

        let nodes = search.tree.node_count();
        let root_node = search.tree.node(SearchTree::ROOT);
        for candidate in valid_actions(self.agent, root, env) {
            let edge = root_node.edge(candidate);
            tracing::debug!(
                action = candidate.as_str(),
                visits = edge.visits,
                mean = edge.mean().unwrap_or(f64::NEG_INFINITY),
                "Root statistics"
            );
        }
        tracing::debug!(action = action.as_str(), optimism, nodes, "Search finished");

        SearchOutcome {
            action,
            optimism,
            nodes,
        }
    }
}

struct Search<'a, R: Rng + ?Sized> {
    agent: usize,
    env: &'a Env,
    rng: &'a mut R,
    bias: Option<ConflictBias>,
    tree: SearchTree,
}

impl<R: Rng + ?Sized> Search<'_, R> {
    /// Discounted return of the searching agent from `id`, growing the tree on the way.
    fn simulate(&mut self, id: NodeId, depth: u32) -> f64 {
        let params = self.env.search;
        let node = self.tree.node(id);
        if node.state.is_finished(self.env) || depth >= params.max_depth {
            return 0.0;
        }

        if node.rollouts < params.expand_threshold {
            let value = self.rollout(id, depth);
            self.tree.node_mut(id).rollouts += 1;
            return value;
        }

        let chosen = self.select(id);
        let children = &self.tree.node(id).edge(chosen).children;
        let child = if children.len() >= params.max_children {
            *children
                .choose(&mut *self.rng)
                .expect("edge at its child limit has children")
        } else {
            self.expand(id, chosen)
        };

        let value =
            self.tree.node(child).reward + params.discount_factor * self.simulate(child, depth + 1);
        self.tree.record(id, chosen, value);
        value
    }

    /// Plays greedy joint actions from `id` until the horizon; adds no nodes.
    fn rollout(&mut self, id: NodeId, mut depth: u32) -> f64 {
        let params = self.env.search;
        let mut state = self.tree.node(id).state.clone();
        let mut value = 0.0;
        let mut discount = 1.0;

        while !state.is_finished(self.env) && depth < params.max_depth {
            let actions = GreedyPlanner::propose(&state, self.env, self.rng, None);
            let step = next_state(&state, &actions, self.env, self.rng, self.bias);
            value += discount * step.rewards[self.agent];
            discount *= params.discount_factor;
            depth += 1;
            state = step.state;
        }
        value
    }

    /// UCT choice among the valid actions at `id`; unvisited actions come first.
    fn select(&mut self, id: NodeId) -> Action {
        let node = self.tree.node(id);
        let total = (node.visits as f64).ln();
        let uct_param = self.env.search.uct_param;

        let scored: Vec<(Action, f64)> = valid_actions(self.agent, &node.state, self.env)
            .into_iter()
            .map(|action| {
                let edge = node.edge(action);
                let score = match edge.mean() {
                    Some(mean) => mean + (uct_param * total / edge.visits as f64).sqrt(),
                    None => f64::INFINITY,
                };
                (action, score)
            })
            .collect();
        best_of(&scored, self.rng)
    }

    /// Samples one successor for `action` with the other agents planning greedily.
    fn expand(&mut self, id: NodeId, action: Action) -> NodeId {
        let state = &self.tree.node(id).state;
        let pinned = Pinned {
            agent: self.agent,
            action,
        };
        let actions = GreedyPlanner::propose(state, self.env, self.rng, Some(pinned));
        let step = next_state(state, &actions, self.env, self.rng, self.bias);
        self.tree
            .add_child(id, action, step.state, step.rewards[self.agent])
    }

    /// Root action with the highest mean return.
    fn decide(&mut self) -> Action {
        let root = self.tree.node(SearchTree::ROOT);
        let scored: Vec<(Action, f64)> = valid_actions(self.agent, &root.state, self.env)
            .into_iter()
            .map(|action| {
                let mean = root.edge(action).mean().unwrap_or(f64::NEG_INFINITY);
                (action, mean)
            })
            .collect();
        best_of(&scored, self.rng)
    }
}

/// Highest-scoring action, ties broken uniformly at random.
fn best_of<R: Rng + ?Sized>(scored: &[(Action, f64)], rng: &mut R) -> Action {
    let best = scored
        .iter()
        .map(|&(_, score)| score)
        .fold(f64::NEG_INFINITY, f64::max);
    let ties: Vec<Action> = scored
        .iter()
        .filter(|&&(_, score)| score == best)
        .map(|&(action, _)| action)
        .collect();
    *ties.choose(rng).expect("a free cell always has a valid move")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::Position;
    use crate::state::{EnvConfig, Map};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn env(rows: &str, config: EnvConfig) -> Env {
        Env::from_config(config, Map::parse(rows).unwrap()).unwrap()
    }

    fn lone_agent(pos: Position, cells: &[(Position, Vec<u32>)]) -> State {
        State::new(
            0,
            vec![pos],
            vec![vec![]],
            cells.iter().cloned().collect::<BTreeMap<_, _>>(),
            Arc::new(Default::default()),
        )
    }

    #[test]
    fn test_picks_up_item_underfoot() {
        let env = env(
            "...\n",
            EnvConfig {
                appear_prob: 0.0,
                iterations: 300,
                max_depth: 8,
                time_limit: 50,
                ..EnvConfig::default()
            },
        );
        let pos = Position::new(1, 0);
        let state = lone_agent(pos, &[(pos, vec![40])]);
        let mut rng = StdRng::seed_from_u64(11);

        let outcome = MctsPlanner::new(0, false).search(&state, &env, &mut rng, 0.5);
        let greedy = GreedyPlanner::propose(&state, &env, &mut rng, None);

        assert_eq!(outcome.action, Action::Pickup);
        assert_eq!(greedy[0], Action::Pickup);
    }

    #[test]
    fn test_branching_is_bounded() {
        let env = env(
            "...\n...\n...\n",
            EnvConfig {
                appear_prob: 0.0,
                iterations: 200,
                max_depth: 2,
                max_children: 2,
                ..EnvConfig::default()
            },
        );
        let state = lone_agent(Position::new(1, 1), &[]);
        let planner = MctsPlanner::new(0, false);

        // four moves from the centre, two sampled successors each
        let outcome = planner.search(&state, &env, &mut StdRng::seed_from_u64(2), 0.5);
        assert_eq!(outcome.nodes, 1 + 4 * 2);

        let mut longer = env.clone();
        longer.search.iterations = 1000;
        let outcome = planner.search(&state, &longer, &mut StdRng::seed_from_u64(2), 0.5);
        assert_eq!(outcome.nodes, 1 + 4 * 2);
    }

    #[test]
    fn test_optimism_update() {
        let env = env(
            "...\n",
            EnvConfig {
                iterations: 5,
                max_depth: 3,
                ..EnvConfig::default()
            },
        );
        let mut state = lone_agent(Position::new(1, 0), &[]);
        let optimistic = MctsPlanner::new(0, true);
        let mut rng = StdRng::seed_from_u64(9);

        assert_eq!(optimistic.search(&state, &env, &mut rng, 0.5).optimism, 0.75);
        assert_eq!(optimistic.search(&state, &env, &mut rng, 0.8).optimism, 1.0);

        state.success[0] = false;
        assert_eq!(optimistic.search(&state, &env, &mut rng, 0.5).optimism, 0.25);

        let plain = MctsPlanner::new(0, false);
        assert_eq!(plain.search(&state, &env, &mut rng, 0.5).optimism, 0.5);
    }

    #[test]
    fn test_valid_actions_include_item_actions() {
        let env = env("...\n", EnvConfig::default());
        let pos = Position::new(1, 0);

        let empty = lone_agent(pos, &[]);
        assert_eq!(valid_actions(0, &empty, &env), vec![Action::Left, Action::Right]);

        let loaded = lone_agent(pos, &[(pos, vec![9])]);
        assert!(valid_actions(0, &loaded, &env).contains(&Action::Pickup));

        let mut home = lone_agent(env.depot, &[]);
        home.agent_items[0] = vec![9];
        assert_eq!(valid_actions(0, &home, &env), vec![Action::Right, Action::Clear]);
    }

    /// Corridor `......` with the depot at the right end. Only the acting agent's
    /// own successes are worth much to it.
    fn corridor(max_items: usize, iterations: u32, max_depth: u32) -> Env {
        env(
            "......\n",
            EnvConfig {
                num_agents: 2,
                max_items,
                pickup_reward: 1.0,
                clear_reward: 0.0,
                diy_bonus: 100.0,
                appear_prob: 0.0,
                depot_pos: Position::new(5, 0),
                discount_factor: 0.5,
                iterations,
                max_depth,
                ..EnvConfig::default()
            },
        )
    }

    fn two_agents(pos: [Position; 2], carried: [Vec<u32>; 2], cells: &[(Position, Vec<u32>)]) -> State {
        State::new(
            0,
            pos.to_vec(),
            carried.to_vec(),
            cells.iter().cloned().collect::<BTreeMap<_, _>>(),
            Arc::new(Default::default()),
        )
    }

    #[test]
    fn test_rollout_return_is_discounted() {
        let env = env(
            "...\n",
            EnvConfig {
                appear_prob: 0.0,
                expand_threshold: 10,
                max_depth: 4,
                ..EnvConfig::default()
            },
        );
        let pos = Position::new(1, 0);
        let state = lone_agent(pos, &[(pos, vec![40])]);
        let mut rng = StdRng::seed_from_u64(6);
        let mut search = Search {
            agent: 0,
            env: &env,
            rng: &mut rng,
            bias: None,
            tree: SearchTree::new(state, env.search.expand_threshold),
        };

        for _ in 0..30 {
            search.simulate(SearchTree::ROOT, 1);
        }

        // children are never expanded, so every return is one edge reward plus a
        // two-step greedy rollout: pick up then clear, or step back then pick up
        let root = search.tree.node(SearchTree::ROOT);
        let pickup = root.edge(Action::Pickup).mean().unwrap();
        let left = root.edge(Action::Left).mean().unwrap();
        let right = root.edge(Action::Right).mean().unwrap();
        assert!((pickup - (100.0 + 0.9 * (0.9 * 100.0))).abs() < 1e-9, "{pickup}");
        assert!((left - 0.9 * (0.9 * 100.0)).abs() < 1e-9, "{left}");
        assert!((right - 0.9 * (0.9 * 100.0)).abs() < 1e-9, "{right}");
        assert!(search.tree.node_count() <= 1 + 3 * env.search.max_children);
    }

    #[test]
    fn test_rollout_applies_conflict_bias() {
        let env = corridor(2, 1, 3);
        // both head for (3, 0); the carrier wins the cell unless the bias overrides it
        let state = two_agents(
            [Position::new(2, 0), Position::new(4, 0)],
            [vec![], vec![30]],
            &[(Position::new(3, 0), vec![40, 41])],
        );

        let rollout = |bias: Option<ConflictBias>| {
            let mut rng = StdRng::seed_from_u64(1);
            let mut search = Search {
                agent: 0,
                env: &env,
                rng: &mut rng,
                bias,
                tree: SearchTree::new(state.clone(), env.search.expand_threshold),
            };
            search.rollout(SearchTree::ROOT, 1)
        };

        // own pickup on the second step, or only the shared reward of the other's
        let favoured = rollout(Some(ConflictBias { agent: 0, win_prob: 1.0 }));
        assert!((favoured - 0.5 * 101.0).abs() < 1e-9, "{favoured}");
        let plain = rollout(None);
        assert!((plain - 0.5 * 1.0).abs() < 1e-9, "{plain}");
    }

    #[test]
    fn test_expansion_applies_conflict_bias() {
        let env = corridor(1, 1, 8);
        let state = two_agents(
            [Position::new(2, 0), Position::new(4, 0)],
            [vec![], vec![]],
            &[(Position::new(3, 0), vec![40])],
        );

        let expand = |bias: Option<ConflictBias>| {
            let mut rng = StdRng::seed_from_u64(1);
            let mut search = Search {
                agent: 0,
                env: &env,
                rng: &mut rng,
                bias,
                tree: SearchTree::new(state.clone(), env.search.expand_threshold),
            };
            let child = search.expand(SearchTree::ROOT, Action::Right);
            search.tree.node(child).state.agent_pos.clone()
        };

        assert_eq!(
            expand(Some(ConflictBias { agent: 0, win_prob: 1.0 })),
            vec![Position::new(3, 0), Position::new(4, 0)]
        );
        assert_eq!(expand(None), vec![Position::new(2, 0), Position::new(3, 0)]);
    }

    #[test]
    fn test_optimism_takes_contested_cell() {
        let env = corridor(1, 400, 8);
        // the near item at (3, 0) is contested and lost on ties; the far one is not
        let state = two_agents(
            [Position::new(2, 0), Position::new(4, 0)],
            [vec![], vec![]],
            &[(Position::new(0, 0), vec![40]), (Position::new(3, 0), vec![40])],
        );

        let optimistic = MctsPlanner::new(0, true).search(&state, &env, &mut StdRng::seed_from_u64(3), 1.0);
        assert_eq!(optimistic.action, Action::Right);

        let plain = MctsPlanner::new(0, false).search(&state, &env, &mut StdRng::seed_from_u64(3), 1.0);
        assert_eq!(plain.action, Action::Left);
    }

    #[test]
    fn test_search_is_reproducible() {
        let env = env(
            "....\n.#..\n....\n",
            EnvConfig {
                num_agents: 2,
                appear_prob: 0.6,
                iterations: 150,
                max_depth: 10,
                ..EnvConfig::default()
            },
        );
        let state = State::initial(&env, &mut StdRng::seed_from_u64(4));
        let planner = MctsPlanner::new(1, true);

        let a = planner.search(&state, &env, &mut StdRng::seed_from_u64(21), 0.5);
        let b = planner.search(&state, &env, &mut StdRng::seed_from_u64(21), 0.5);
        assert_eq!(a, b);
    }
}
