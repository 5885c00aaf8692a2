use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::engine::{Transition, next_state};
use crate::infra::{Action, Position, SimObserver};
use crate::planners;
use crate::sim::result::{Metrics, SimulationResult};
use crate::sim::snapshot::Snapshot;
use crate::state::{Env, State};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("planner for agent {agent} failed: {source}")]
    Planner {
        agent: usize,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// What the observer sees after every turn.
pub struct TurnRecord<'a> {
    pub env: &'a Env,
    pub state: &'a State,
    pub actions: &'a [Action],
    pub rewards: &'a [f64],
    pub total_rewards: &'a [f64],
    pub appeared: Option<Position>,
}

impl TurnRecord<'_> {
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            env: self.env,
            state: self.state,
            actions: Some(self.actions),
            appeared: self.appeared,
            total_rewards: self.total_rewards,
            last_rewards: Some(self.rewards),
        }
    }
}

/// Turn orchestrator: plans every agent concurrently, then applies the joint action.
pub struct Simulator {
    env: Arc<Env>,
    seed: u64,
    state: Arc<State>,
    rng: StdRng,
    agent_rngs: Vec<StdRng>,
    optimism: Vec<f64>,
    metrics: Metrics,
    last_actions: Option<Vec<Action>>,
    last_rewards: Option<Vec<f64>>,
    last_appeared: Option<Position>,
    /// Set once a planner task fails; the run does not advance afterwards.
    halted: bool,
    observer: Box<dyn SimObserver>,
}

impl Simulator {
    pub fn new(env: Arc<Env>, seed: u64, observer: impl SimObserver + 'static) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let agent_rngs = (0..env.num_agents)
            .map(|_| StdRng::seed_from_u64(rng.random()))
            .collect();
        let state = State::initial(&env, &mut rng);

        Self {
            seed,
            state: Arc::new(state),
            rng,
            agent_rngs,
            optimism: vec![env.initial_optimism; env.num_agents],
            metrics: Metrics::new(env.num_agents),
            last_actions: None,
            last_rewards: None,
            last_appeared: None,
            halted: false,
            observer: Box::new(observer),
            env,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Plays one turn. Returns `false` without doing anything once the last turn is
    /// reached or after a planner failure was reported.
    pub async fn step(&mut self) -> Result<bool, SimError> {
        if self.halted || self.state.is_finished(&self.env) {
            return Ok(false);
        }

        let actions = self.plan().await?;
        self.observer.on_actions_selected(&self.state, &actions);

        let Transition {
            state,
            rewards,
            appeared,
        } = next_state(&self.state, &actions, &self.env, &mut self.rng, None);
        self.record(&actions, &state, &rewards, appeared);

        self.state = Arc::new(state);
        self.observer.on_turn(&TurnRecord {
            env: &self.env,
            state: &self.state,
            actions: &actions,
            rewards: &rewards,
            total_rewards: &self.metrics.total_rewards,
            appeared,
        });

        self.last_actions = Some(actions);
        self.last_rewards = Some(rewards);
        self.last_appeared = appeared;
        Ok(true)
    }

    /// Runs every agent's planner on its own blocking task and joins them in id order.
    ///
    /// All tasks are joined even when one fails; the first failure halts the simulator.
    async fn plan(&mut self) -> Result<Vec<Action>, SimError> {
        let rngs = std::mem::take(&mut self.agent_rngs);
        let handles: Vec<_> = rngs
            .into_iter()
            .enumerate()
            .map(|(agent, mut rng)| {
                let env = Arc::clone(&self.env);
                let state = Arc::clone(&self.state);
                let optimism = self.optimism[agent];
                tokio::task::spawn_blocking(move || {
                    let decision = planners::decide(agent, &state, &env, &mut rng, optimism);
                    (decision, rng)
                })
            })
            .collect();

        let mut actions = Vec::with_capacity(handles.len());
        let mut failure = None;
        for (agent, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok((decision, rng)) => {
                    actions.push(decision.action);
                    self.optimism[agent] = decision.optimism;
                    self.agent_rngs.push(rng);
                }
                Err(source) => {
                    tracing::error!(agent, error = %source, "Planner task failed");
                    failure.get_or_insert(SimError::Planner { agent, source });
                }
            }
        }

        match failure {
            Some(err) => {
                self.halted = true;
                Err(err)
            }
            None => Ok(actions),
        }
    }

    fn record(&mut self, actions: &[Action], next: &State, rewards: &[f64], appeared: Option<Position>) {
        let metrics = &mut self.metrics;
        if appeared.is_some() {
            metrics.total_items += 1;
        }
        for (agent, &action) in actions.iter().enumerate() {
            metrics.total_rewards[agent] += rewards[agent];
            if !next.success[agent] {
                continue;
            }
            metrics.success_counts[agent] += 1;
            match action {
                Action::Pickup => metrics.pickup_counts[agent] += 1,
                Action::Clear => {
                    metrics.clear_counts[agent] += 1;
                    metrics.delivered_items += self.state.agent_items[agent].len();
                }
                _ => {}
            }
        }
    }

    /// Plays every remaining turn.
    pub async fn run(&mut self) -> Result<SimulationResult, SimError> {
        let start = Instant::now();
        self.observer.on_run_start(&self.env, self.seed, &self.state);

        while self.step().await? {}

        let result = self.result(start.elapsed().as_secs_f64());
        self.observer.on_run_finished(&result);
        Ok(result)
    }

    /// Text snapshot of the current turn.
    pub fn dump_state(&self) -> String {
        Snapshot {
            env: &self.env,
            state: &self.state,
            actions: self.last_actions.as_deref(),
            appeared: self.last_appeared,
            total_rewards: &self.metrics.total_rewards,
            last_rewards: self.last_rewards.as_deref(),
        }
        .to_string()
    }

    pub fn result(&self, process_time: f64) -> SimulationResult {
        SimulationResult {
            env_name: self.env.name.clone(),
            seed: self.seed,
            total_items: self.metrics.total_items,
            delivered_items: self.metrics.delivered_items,
            pickup_counts: self.metrics.pickup_counts.clone(),
            clear_counts: self.metrics.clear_counts.clone(),
            success_counts: self.metrics.success_counts.clone(),
            total_rewards: self.metrics.total_rewards.clone(),
            process_time,
        }
    }
}
