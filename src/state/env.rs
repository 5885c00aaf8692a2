use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infra::{Action, DistanceTable, Position, UNREACHABLE};
use crate::state::Map;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("can't read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("can't decode `{path}`: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("map has no cells")]
    EmptyMap,
    #[error("map row {row} has width {found}, expected {expected}")]
    RaggedMap {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("depot ({}, {}) is not a free cell", .0.x, .0.y)]
    InvalidDepot(Position),
    #[error("cell ({}, {}) cannot reach the depot", .0.x, .0.y)]
    Unreachable(Position),
    #[error("cell ({}, {}) has no valid move", .0.x, .0.y)]
    NoMoves(Position),
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// How simultaneous moves into the same cell are settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictPolicy {
    /// Every contender stays where it is.
    AllStay,
    /// One contender wins by depot presence, then earliest carried deadline.
    #[default]
    DeadlineBase,
}

/// Decision policy used by one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    #[default]
    Greedy,
    Mcts,
    MctsOpt,
}

/// Environment description as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub name: String,
    pub num_agents: usize,
    pub max_items: usize,
    pub last_turn: u32,
    pub time_limit: u32,
    pub pickup_reward: f64,
    pub clear_reward: f64,
    #[serde(rename = "DIY_bonus")]
    pub diy_bonus: f64,
    pub map_data_path: String,
    pub appear_prob: f64,
    pub depot_pos: Position,
    pub conflict_policy: ConflictPolicy,
    /// Algorithm for every agent unless `algorithms` lists one per agent.
    pub algorithm: Algorithm,
    pub algorithms: Vec<Algorithm>,
    pub initial_optimism: f64,
    pub spawn_at_depot: bool,

    #[serde(rename = "mcts_discount_factor")]
    pub discount_factor: f64,
    #[serde(rename = "mcts_expand_thresh")]
    pub expand_threshold: u32,
    #[serde(rename = "mcts_max_childs")]
    pub max_children: usize,
    #[serde(rename = "mcts_max_depth")]
    pub max_depth: u32,
    #[serde(rename = "mcts_num_of_iter")]
    pub iterations: u32,
    pub uct_param: f64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            name: "warehouse".to_string(),
            num_agents: 1,
            max_items: 1,
            last_turn: 100,
            time_limit: 50,
            pickup_reward: 100.0,
            clear_reward: 100.0,
            diy_bonus: 0.0,
            map_data_path: "map_data.txt".to_string(),
            appear_prob: 0.5,
            depot_pos: Position::new(0, 0),
            conflict_policy: ConflictPolicy::DeadlineBase,
            algorithm: Algorithm::Greedy,
            algorithms: Vec::new(),
            initial_optimism: 0.5,
            spawn_at_depot: false,
            discount_factor: 0.9,
            expand_threshold: 1,
            max_children: 5,
            max_depth: 60,
            iterations: 1000,
            uct_param: 2.0,
        }
    }
}

impl EnvConfig {
    fn from_json_file(path: &Path) -> Result<Self, EnvError> {
        let text = fs::read_to_string(path).map_err(|source| EnvError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| EnvError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Monte-Carlo search hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub discount_factor: f64,
    pub expand_threshold: u32,
    pub max_children: usize,
    pub max_depth: u32,
    pub iterations: u32,
    pub uct_param: f64,
}

/// Read-only environment oracle shared by every component for the whole run.
#[derive(Debug, Clone)]
pub struct Env {
    pub name: String,
    pub num_agents: usize,
    pub max_items: usize,
    pub last_turn: u32,
    pub time_limit: u32,
    pub pickup_reward: f64,
    pub clear_reward: f64,
    pub diy_bonus: f64,
    pub appear_prob: f64,
    pub conflict_policy: ConflictPolicy,
    pub algorithms: Vec<Algorithm>,
    pub initial_optimism: f64,
    pub search: SearchParams,
    pub map: Map,
    pub depot: Position,
    /// Free cells where items may appear and agents may start.
    pub spawn_cells: Vec<Position>,
    valid_moves: Vec<Vec<Action>>,
    distances: DistanceTable,
}

impl Env {
    /// Loads the JSON description at `path` and the map it references.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let path = path.as_ref();
        let config = EnvConfig::from_json_file(path)?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let map_path = dir.join(&config.map_data_path);
        let text = fs::read_to_string(&map_path).map_err(|source| EnvError::Io {
            path: map_path.clone(),
            source,
        })?;
        let map = Map::parse(&text)?;

        tracing::info!(
            name = %config.name,
            path = %path.display(),
            map = %map_path.display(),
            "Loaded environment"
        );
        Self::from_config(config, map)
    }

    /// Validates `config` against `map` and precomputes the static tables.
    pub fn from_config(config: EnvConfig, map: Map) -> Result<Self, EnvError> {
        validate_parameters(&config)?;

        let depot = config.depot_pos;
        if !map.is_free(&depot) {
            return Err(EnvError::InvalidDepot(depot));
        }

        let distances = DistanceTable::compute(&map);
        let mut valid_moves = vec![Vec::new(); map.len()];
        let mut spawn_cells = Vec::new();
        for pos in map.free_cells() {
            if distances.distance(pos, depot) == UNREACHABLE {
                return Err(EnvError::Unreachable(pos));
            }
            let moves = map.valid_moves(pos);
            if moves.is_empty() {
                return Err(EnvError::NoMoves(pos));
            }
            if let Some(index) = map.index(&pos) {
                valid_moves[index] = moves;
            }
            if pos != depot || config.spawn_at_depot {
                spawn_cells.push(pos);
            }
        }

        let non_depot = spawn_cells.iter().filter(|&&pos| pos != depot).count();
        if non_depot < config.num_agents {
            return Err(invalid(
                "num_agents",
                format!("{} agents need as many free cells, map has {}", config.num_agents, non_depot),
            ));
        }

        let algorithms = if config.algorithms.is_empty() {
            vec![config.algorithm; config.num_agents]
        } else if config.algorithms.len() == config.num_agents {
            config.algorithms.clone()
        } else {
            return Err(invalid(
                "algorithms",
                format!(
                    "{} entries for {} agents",
                    config.algorithms.len(),
                    config.num_agents
                ),
            ));
        };

        Ok(Self {
            name: config.name,
            num_agents: config.num_agents,
            max_items: config.max_items,
            last_turn: config.last_turn,
            time_limit: config.time_limit,
            pickup_reward: config.pickup_reward,
            clear_reward: config.clear_reward,
            diy_bonus: config.diy_bonus,
            appear_prob: config.appear_prob,
            conflict_policy: config.conflict_policy,
            algorithms,
            initial_optimism: config.initial_optimism,
            search: SearchParams {
                discount_factor: config.discount_factor,
                expand_threshold: config.expand_threshold,
                max_children: config.max_children,
                max_depth: config.max_depth,
                iterations: config.iterations,
                uct_param: config.uct_param,
            },
            map,
            depot,
            spawn_cells,
            valid_moves,
            distances,
        })
    }

    /// Move actions available at `pos`. Never empty for a free cell.
    pub fn valid_moves(&self, pos: Position) -> &[Action] {
        self.map
            .index(&pos)
            .map(|i| self.valid_moves[i].as_slice())
            .unwrap_or(&[])
    }

    pub fn distance(&self, from: Position, to: Position) -> u32 {
        self.distances.distance(from, to)
    }

    pub fn next_pos(&self, pos: Position, action: Action) -> Position {
        self.map.next_pos(pos, action)
    }

    pub fn algorithm(&self, agent: usize) -> Algorithm {
        self.algorithms[agent]
    }
}

fn invalid(name: &'static str, reason: String) -> EnvError {
    EnvError::InvalidParameter { name, reason }
}

fn validate_parameters(config: &EnvConfig) -> Result<(), EnvError> {
    if config.num_agents == 0 {
        return Err(invalid("num_agents", "must be at least 1".to_string()));
    }
    if config.max_items == 0 {
        return Err(invalid("max_items", "must be at least 1".to_string()));
    }
    if config.time_limit == 0 {
        return Err(invalid("time_limit", "must be at least 1".to_string()));
    }
    if !(0.0..=1.0).contains(&config.appear_prob) {
        return Err(invalid("appear_prob", format!("{} is not a probability", config.appear_prob)));
    }
    if !(0.0..=1.0).contains(&config.initial_optimism) {
        return Err(invalid(
            "initial_optimism",
            format!("{} is outside [0, 1]", config.initial_optimism),
        ));
    }
    if !(config.discount_factor > 0.0 && config.discount_factor <= 1.0) {
        return Err(invalid(
            "mcts_discount_factor",
            format!("{} is outside (0, 1]", config.discount_factor),
        ));
    }
    if config.max_children == 0 {
        return Err(invalid("mcts_max_childs", "must be at least 1".to_string()));
    }
    if config.uct_param < 0.0 {
        return Err(invalid("uct_param", format!("{} is negative", config.uct_param)));
    }
    Ok(())
}
