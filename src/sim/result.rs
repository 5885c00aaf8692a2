use serde::{Deserialize, Serialize};

/// Summary of one finished run, written as JSON by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub env_name: String,
    pub seed: u64,
    /// Items that appeared during the run.
    pub total_items: usize,
    /// Items cleared at the depot.
    pub delivered_items: usize,
    pub pickup_counts: Vec<usize>,
    pub clear_counts: Vec<usize>,
    /// Turns in which each agent's own action took effect.
    pub success_counts: Vec<usize>,
    pub total_rewards: Vec<f64>,
    /// Wall-clock seconds.
    pub process_time: f64,
}

impl SimulationResult {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Running counters kept by the simulator.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Metrics {
    pub total_items: usize,
    pub delivered_items: usize,
    pub pickup_counts: Vec<usize>,
    pub clear_counts: Vec<usize>,
    pub success_counts: Vec<usize>,
    pub total_rewards: Vec<f64>,
}

impl Metrics {
    pub fn new(num_agents: usize) -> Self {
        Self {
            pickup_counts: vec![0; num_agents],
            clear_counts: vec![0; num_agents],
            success_counts: vec![0; num_agents],
            total_rewards: vec![0.0; num_agents],
            ..Self::default()
        }
    }
}
