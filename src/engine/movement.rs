use std::cmp::Reverse;
use std::collections::HashMap;

use rand::Rng;

use crate::infra::{Action, Position};
use crate::state::{ConflictPolicy, Env, State};

/// Skews contention outcomes in favour of one agent during its own planning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConflictBias {
    pub agent: usize,
    /// Chance that the agent wins a contention it would otherwise lose.
    pub win_prob: f64,
}

/// Movement-side result of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub positions: Vec<Position>,
    pub success: Vec<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Unvisited,
    Pending,
    Resolved,
}

enum Frame {
    Enter(usize),
    Settle(usize),
}

/// Computes collision-free next positions for simultaneous moves.
///
/// Agents are resolved by a depth-first walk over the "wants to enter the cell of"
/// relation: an agent moving into an occupied cell waits for the occupant, and a
/// target whose occupant stays, or is still pending (a cycle), turns every
/// contender for that cell back. The depot never blocks or contends.
pub fn resolve_moves<R: Rng + ?Sized>(
    state: &State,
    actions: &[Action],
    env: &Env,
    rng: &mut R,
    bias: Option<ConflictBias>,
) -> MoveOutcome {
    let mut resolver = Resolver::new(state, actions, env, rng, bias);
    resolver.run();
    MoveOutcome {
        positions: resolver.next,
        success: resolver.success,
    }
}

struct Resolver<'a, R: Rng + ?Sized> {
    state: &'a State,
    env: &'a Env,
    rng: &'a mut R,
    bias: Option<ConflictBias>,
    desired: Vec<Position>,
    occupant: HashMap<Position, usize>,
    candidates: HashMap<Position, Vec<usize>>,
    status: Vec<Status>,
    next: Vec<Position>,
    success: Vec<bool>,
}

impl<'a, R: Rng + ?Sized> Resolver<'a, R> {
    fn new(
        state: &'a State,
        actions: &[Action],
        env: &'a Env,
        rng: &'a mut R,
        bias: Option<ConflictBias>,
    ) -> Self {
        let num_agents = state.num_agents();
        let mut desired = Vec::with_capacity(num_agents);
        let mut occupant = HashMap::new();
        let mut candidates: HashMap<Position, Vec<usize>> = HashMap::new();

        for (agent, &current) in state.agent_pos.iter().enumerate() {
            if current != env.depot {
                occupant.insert(current, agent);
            }
            let target = env.next_pos(current, actions[agent]);
            if target != current {
                candidates.entry(target).or_default().push(agent);
            }
            desired.push(target);
        }

        Self {
            state,
            env,
            rng,
            bias,
            desired,
            occupant,
            candidates,
            status: vec![Status::Unvisited; num_agents],
            next: state.agent_pos.clone(),
            success: vec![false; num_agents],
        }
    }

    fn run(&mut self) {
        let mut stack = Vec::new();
        for start in 0..self.status.len() {
            if self.status[start] != Status::Unvisited {
                continue;
            }
            stack.push(Frame::Enter(start));

            while let Some(frame) = stack.pop() {
                match frame {
                    Frame::Enter(agent) => {
                        if self.status[agent] != Status::Unvisited {
                            continue;
                        }
                        self.status[agent] = Status::Pending;

                        let target = self.desired[agent];
                        if target == self.state.agent_pos[agent] || target == self.env.depot {
                            self.accept(agent);
                            continue;
                        }

                        if let Some(&occupant) = self.occupant.get(&target)
                            && self.status[occupant] == Status::Unvisited
                        {
                            stack.push(Frame::Settle(agent));
                            stack.push(Frame::Enter(occupant));
                            continue;
                        }
                        self.settle(agent);
                    }
                    Frame::Settle(agent) => {
                        if self.status[agent] != Status::Resolved {
                            self.settle(agent);
                        }
                    }
                }
            }
        }
    }

    /// Decides every contender for `agent`'s target cell at once.
    fn settle(&mut self, agent: usize) {
        let target = self.desired[agent];
        let contenders = self.candidates.get(&target).cloned().unwrap_or_default();

        if let Some(&occupant) = self.occupant.get(&target) {
            let stays = self.next[occupant] == self.state.agent_pos[occupant];
            if self.status[occupant] == Status::Pending || stays {
                tracing::trace!(?target, occupant, ?contenders, "Target blocked");
                for contender in contenders {
                    self.reject(contender);
                }
                return;
            }
        }

        if contenders.len() == 1 {
            self.accept(agent);
            return;
        }

        let winner = self.pick_winner(target, &contenders);
        tracing::trace!(?target, ?contenders, ?winner, "Contention");
        for contender in contenders {
            if Some(contender) == winner {
                self.accept(contender);
            } else {
                self.reject(contender);
            }
        }
    }

    fn pick_winner(&mut self, target: Position, contenders: &[usize]) -> Option<usize> {
        let winner = match self.env.conflict_policy {
            ConflictPolicy::AllStay => None,
            ConflictPolicy::DeadlineBase => {
                let stationed = self
                    .occupant
                    .get(&target)
                    .copied()
                    .filter(|occupant| contenders.contains(occupant));
                stationed.or_else(|| {
                    contenders.iter().copied().max_by_key(|&c| {
                        (
                            self.state.agent_pos[c] == self.env.depot,
                            Reverse(self.state.earliest_deadline(c)),
                            c,
                        )
                    })
                })
            }
        };

        match self.bias {
            Some(bias)
                if winner != Some(bias.agent)
                    && contenders.contains(&bias.agent)
                    && self.rng.random_bool(bias.win_prob.clamp(0.0, 1.0)) =>
            {
                Some(bias.agent)
            }
            _ => winner,
        }
    }

    fn accept(&mut self, agent: usize) {
        self.next[agent] = self.desired[agent];
        self.success[agent] = true;
        self.status[agent] = Status::Resolved;
    }

    fn reject(&mut self, agent: usize) {
        self.next[agent] = self.state.agent_pos[agent];
        self.success[agent] = false;
        self.status[agent] = Status::Resolved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EnvConfig, Map};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::IndexedRandom;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Arc;

    fn env(num_agents: usize, policy: ConflictPolicy) -> Env {
        let config = EnvConfig {
            num_agents,
            max_items: 3,
            conflict_policy: policy,
            ..EnvConfig::default()
        };
        let map = Map::parse(".....\n.....\n.....\n.....\n.....\n").unwrap();
        Env::from_config(config, map).unwrap()
    }

    fn state(agent_pos: Vec<Position>, agent_items: Vec<Vec<u32>>) -> State {
        State::new(
            1,
            agent_pos,
            agent_items,
            BTreeMap::new(),
            Arc::new(Default::default()),
        )
    }

    fn resolve(state: &State, actions: &[Action], env: &Env) -> MoveOutcome {
        let mut rng = StdRng::seed_from_u64(0);
        resolve_moves(state, actions, env, &mut rng, None)
    }

    #[test]
    fn test_swap_deadlock() {
        let env = env(2, ConflictPolicy::DeadlineBase);
        let a = Position::new(1, 1);
        let b = Position::new(2, 1);
        let state = state(vec![a, b], vec![vec![], vec![]]);

        let outcome = resolve(&state, &[Action::Right, Action::Left], &env);

        assert_eq!(outcome.positions, vec![a, b]);
        assert_eq!(outcome.success, vec![false, false]);
    }

    #[test]
    fn test_rotation_cycle_stays() {
        let env = env(4, ConflictPolicy::DeadlineBase);
        let cells = vec![
            Position::new(1, 1),
            Position::new(2, 1),
            Position::new(2, 2),
            Position::new(1, 2),
        ];
        let state = state(cells.clone(), vec![vec![]; 4]);
        let actions = [Action::Right, Action::Down, Action::Left, Action::Up];

        let outcome = resolve(&state, &actions, &env);

        assert_eq!(outcome.positions, cells);
        assert!(outcome.success.iter().all(|&s| !s));
    }

    #[test]
    fn test_train_follows_leader() {
        let env = env(3, ConflictPolicy::DeadlineBase);
        let state = state(
            vec![Position::new(1, 2), Position::new(2, 2), Position::new(3, 2)],
            vec![vec![]; 3],
        );
        let actions = [Action::Right, Action::Right, Action::Right];

        let outcome = resolve(&state, &actions, &env);

        assert_eq!(
            outcome.positions,
            vec![Position::new(2, 2), Position::new(3, 2), Position::new(4, 2)]
        );
        assert_eq!(outcome.success, vec![true, true, true]);
    }

    #[test]
    fn test_blocked_chain_cascades() {
        let env = env(3, ConflictPolicy::DeadlineBase);
        let cells = vec![Position::new(1, 2), Position::new(2, 2), Position::new(3, 2)];
        let state = state(cells.clone(), vec![vec![]; 3]);
        // the head picks up (stays), so the two behind it cannot advance
        let actions = [Action::Right, Action::Right, Action::Pickup];

        let outcome = resolve(&state, &actions, &env);

        assert_eq!(outcome.positions, cells);
        assert_eq!(outcome.success, vec![false, false, true]);
    }

    #[test]
    fn test_deadline_base_earliest_deadline_wins() {
        let env = env(3, ConflictPolicy::DeadlineBase);
        let target = Position::new(2, 2);
        let state = state(
            vec![Position::new(1, 2), Position::new(3, 2), Position::new(2, 1)],
            vec![vec![20], vec![15, 30], vec![]],
        );
        let actions = [Action::Right, Action::Left, Action::Down];

        let outcome = resolve(&state, &actions, &env);

        assert_eq!(outcome.positions[1], target);
        assert_eq!(outcome.positions[0], Position::new(1, 2));
        assert_eq!(outcome.positions[2], Position::new(2, 1));
        assert_eq!(outcome.success, vec![false, true, false]);
    }

    #[test]
    fn test_deadline_base_depot_agent_wins() {
        let env = env(2, ConflictPolicy::DeadlineBase);
        // depot is (0, 0); both contend for (1, 0)
        let state = state(
            vec![env.depot, Position::new(2, 0)],
            vec![vec![], vec![3]],
        );

        let outcome = resolve(&state, &[Action::Right, Action::Left], &env);

        assert_eq!(outcome.positions, vec![Position::new(1, 0), Position::new(2, 0)]);
        assert_eq!(outcome.success, vec![true, false]);
    }

    #[test]
    fn test_deadline_base_tie_goes_to_higher_id() {
        let env = env(2, ConflictPolicy::DeadlineBase);
        let state = state(
            vec![Position::new(1, 3), Position::new(3, 3)],
            vec![vec![12], vec![12]],
        );

        let outcome = resolve(&state, &[Action::Right, Action::Left], &env);

        assert_eq!(outcome.success, vec![false, true]);
        assert_eq!(outcome.positions[1], Position::new(2, 3));
    }

    #[test]
    fn test_all_stay_contention() {
        let env = env(3, ConflictPolicy::AllStay);
        let cells = vec![Position::new(1, 2), Position::new(3, 2), Position::new(2, 1)];
        let state = state(cells.clone(), vec![vec![20], vec![15], vec![]]);
        let actions = [Action::Right, Action::Left, Action::Down];

        let outcome = resolve(&state, &actions, &env);

        assert_eq!(outcome.positions, cells);
        assert_eq!(outcome.success, vec![false, false, false]);
    }

    #[test]
    fn test_contention_into_vacated_cell() {
        let env = env(3, ConflictPolicy::DeadlineBase);
        // agent 2 leaves (2, 2) while 0 and 1 both want it
        let state = state(
            vec![Position::new(1, 2), Position::new(3, 2), Position::new(2, 2)],
            vec![vec![9], vec![], vec![]],
        );
        let actions = [Action::Right, Action::Left, Action::Down];

        let outcome = resolve(&state, &actions, &env);

        assert_eq!(
            outcome.positions,
            vec![Position::new(2, 2), Position::new(3, 2), Position::new(2, 3)]
        );
        assert_eq!(outcome.success, vec![true, false, true]);
    }

    #[test]
    fn test_depot_is_shared() {
        let env = env(3, ConflictPolicy::AllStay);
        let state = state(
            vec![env.depot, Position::new(1, 0), Position::new(0, 1)],
            vec![vec![]; 3],
        );
        let actions = [Action::Clear, Action::Left, Action::Up];

        let outcome = resolve(&state, &actions, &env);

        assert_eq!(outcome.positions, vec![env.depot; 3]);
        assert_eq!(outcome.success, vec![true, true, true]);
    }

    #[test]
    fn test_wall_move_counts_as_stay() {
        let env = env(1, ConflictPolicy::DeadlineBase);
        let state = state(vec![Position::new(0, 2)], vec![vec![]]);
        let outcome = resolve(&state, &[Action::Left], &env);
        assert_eq!(outcome.positions, vec![Position::new(0, 2)]);
        assert_eq!(outcome.success, vec![true]);
    }

    #[test]
    fn test_bias_overrides_loss() {
        let env = env(2, ConflictPolicy::AllStay);
        let state = state(
            vec![Position::new(1, 3), Position::new(3, 3)],
            vec![vec![], vec![]],
        );
        let actions = [Action::Right, Action::Left];
        let mut rng = StdRng::seed_from_u64(9);

        let certain = ConflictBias { agent: 0, win_prob: 1.0 };
        let outcome = resolve_moves(&state, &actions, &env, &mut rng, Some(certain));
        assert_eq!(outcome.success, vec![true, false]);
        assert_eq!(outcome.positions[0], Position::new(2, 3));

        let never = ConflictBias { agent: 0, win_prob: 0.0 };
        let outcome = resolve_moves(&state, &actions, &env, &mut rng, Some(never));
        assert_eq!(outcome.success, vec![false, false]);
    }

    #[test]
    fn test_bias_does_not_lift_a_block() {
        let env = env(2, ConflictPolicy::DeadlineBase);
        let a = Position::new(1, 1);
        let b = Position::new(2, 1);
        let state = state(vec![a, b], vec![vec![], vec![]]);
        let mut rng = StdRng::seed_from_u64(2);
        let bias = ConflictBias { agent: 0, win_prob: 1.0 };

        let outcome = resolve_moves(&state, &[Action::Right, Action::Stay], &env, &mut rng, Some(bias));

        assert_eq!(outcome.positions, vec![a, b]);
        assert_eq!(outcome.success, vec![false, true]);
    }

    #[test]
    fn test_random_moves_never_collide() {
        let num_agents = 12;
        for policy in [ConflictPolicy::AllStay, ConflictPolicy::DeadlineBase] {
            let env = env(num_agents, policy);
            let mut rng = StdRng::seed_from_u64(42);
            let mut state = State::initial(&env, &mut rng);

            for _ in 0..300 {
                let actions: Vec<Action> = (0..num_agents)
                    .map(|_| *Action::ALL.choose(&mut rng).unwrap())
                    .collect();
                let outcome = resolve_moves(&state, &actions, &env, &mut rng, None);

                let mut seen = HashSet::new();
                for pos in &outcome.positions {
                    assert!(*pos == env.depot || seen.insert(*pos), "collision at {:?}", pos);
                    assert!(env.map.is_free(pos));
                }
                for (agent, &moved) in outcome.success.iter().enumerate() {
                    if !moved {
                        assert_eq!(outcome.positions[agent], state.agent_pos[agent]);
                    }
                }
                state.agent_pos = outcome.positions;
            }
        }
    }
}
