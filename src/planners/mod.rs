pub mod greedy;
pub mod mcts;

pub use greedy::{Assignment, GreedyPlanner, Pinned};
pub use mcts::{MctsPlanner, SearchOutcome, SearchTree};

use rand::Rng;

use crate::infra::Action;
use crate::state::{Algorithm, Env, State};

/// One agent's choice for the coming turn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    pub action: Action,
    /// Optimism level carried into the next turn; unchanged for non-optimistic planners.
    pub optimism: f64,
}

/// Runs the planner configured for `agent` on `state`.
pub fn decide<R: Rng + ?Sized>(
    agent: usize,
    state: &State,
    env: &Env,
    rng: &mut R,
    optimism: f64,
) -> Decision {
    match env.algorithm(agent) {
        Algorithm::Greedy => Decision {
            action: GreedyPlanner::propose(state, env, rng, None)[agent],
            optimism,
        },
        Algorithm::Mcts | Algorithm::MctsOpt => {
            let optimistic = env.algorithm(agent) == Algorithm::MctsOpt;
            let outcome = MctsPlanner::new(agent, optimistic).search(state, env, rng, optimism);
            Decision {
                action: outcome.action,
                optimism: outcome.optimism,
            }
        }
    }
}
