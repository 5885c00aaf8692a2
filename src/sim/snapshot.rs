use std::fmt;

use crate::infra::{Action, Position};
use crate::state::{Env, State};

/// Text rendering of one turn: grid, new item, actions, carried items and rewards.
pub struct Snapshot<'a> {
    pub env: &'a Env,
    pub state: &'a State,
    pub actions: Option<&'a [Action]>,
    pub appeared: Option<Position>,
    pub total_rewards: &'a [f64],
    pub last_rewards: Option<&'a [f64]>,
}

impl<'a> Snapshot<'a> {
    /// Snapshot of a state nobody has acted in yet.
    pub fn initial(env: &'a Env, state: &'a State) -> Self {
        Self {
            env,
            state,
            actions: None,
            appeared: None,
            total_rewards: &[],
            last_rewards: None,
        }
    }

    fn grid(&self) -> Vec<Vec<char>> {
        let mut grid: Vec<Vec<char>> = self
            .env
            .map
            .rows()
            .iter()
            .map(|row| row.chars().collect())
            .collect();
        let mut put = |pos: Position, c: char| {
            if let Some(cell) = grid
                .get_mut(pos.y as usize)
                .and_then(|row| row.get_mut(pos.x as usize))
            {
                *cell = c;
            }
        };

        put(self.env.depot, 'D');
        for &pos in self.state.cell_items.keys() {
            put(pos, '*');
        }
        for (agent, &pos) in self.state.agent_pos.iter().enumerate() {
            put(pos, agent_glyph(agent));
        }
        grid
    }
}

/// Digits, then letters, for agents beyond nine.
fn agent_glyph(agent: usize) -> char {
    char::from_digit((agent % 36) as u32, 36).unwrap_or('?')
}

fn signed(delta: f64) -> String {
    if delta == 0.0 {
        "±0".to_string()
    } else if delta > 0.0 {
        format!("+{}", delta)
    } else {
        delta.to_string()
    }
}

impl fmt::Display for Snapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[TURN {}]", self.state.turn)?;
        for row in self.grid() {
            writeln!(f, "{}", row.into_iter().collect::<String>())?;
        }

        if let Some(pos) = self.appeared {
            writeln!(f, "[NEW ITEM]")?;
            writeln!(f, "({}, {})", pos.x, pos.y)?;
        }

        if let Some(actions) = self.actions {
            writeln!(f, "[ACTIONS]")?;
            let line: Vec<String> = actions
                .iter()
                .enumerate()
                .map(|(agent, action)| format!("agent {}: {}", agent, action.as_str()))
                .collect();
            writeln!(f, "{}", line.join(" "))?;
        }

        writeln!(f, "[ITEMS]")?;
        let line: Vec<String> = self
            .state
            .agent_items
            .iter()
            .enumerate()
            .map(|(agent, items)| format!("agent {}: {:?}", agent, items))
            .collect();
        writeln!(f, "{}", line.join(" "))?;

        write!(f, "[REWARDS]")?;
        let line: Vec<String> = (0..self.state.num_agents())
            .map(|agent| {
                let total = self.total_rewards.get(agent).copied().unwrap_or(0.0);
                let last = self
                    .last_rewards
                    .and_then(|rewards| rewards.get(agent).copied())
                    .unwrap_or(0.0);
                format!("agent {}: {} ({})", agent, total, signed(last))
            })
            .collect();
        write!(f, "\n{}", line.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EnvConfig, Map};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn env() -> Env {
        let config = EnvConfig {
            num_agents: 2,
            depot_pos: Position::new(0, 1),
            ..EnvConfig::default()
        };
        Env::from_config(config, Map::parse("...\n.#.\n...\n").unwrap()).unwrap()
    }

    fn state() -> State {
        let mut cells = BTreeMap::new();
        cells.insert(Position::new(2, 2), vec![14]);
        State::new(
            3,
            vec![Position::new(1, 0), Position::new(2, 1)],
            vec![vec![], vec![9, 12]],
            cells,
            Arc::new(Default::default()),
        )
    }

    #[test]
    fn test_initial_snapshot() {
        let env = env();
        let state = state();
        let text = Snapshot::initial(&env, &state).to_string();

        assert_eq!(
            text,
            "[TURN 3]\n\
             .0.\n\
             D#1\n\
             ..*\n\
             [ITEMS]\n\
             agent 0: [] agent 1: [9, 12]\n\
             [REWARDS]\n\
             agent 0: 0 (±0) agent 1: 0 (±0)"
        );
    }

    #[test]
    fn test_snapshot_after_turn() {
        let env = env();
        let state = state();
        let actions = [Action::Stay, Action::Pickup];
        let snapshot = Snapshot {
            env: &env,
            state: &state,
            actions: Some(&actions),
            appeared: Some(Position::new(2, 2)),
            total_rewards: &[110.0, 100.0],
            last_rewards: Some(&[-5.0, 100.0]),
        };
        let text = snapshot.to_string();

        assert!(text.contains("[NEW ITEM]\n(2, 2)\n"));
        assert!(text.contains("[ACTIONS]\nagent 0: STAY agent 1: PICKUP\n"));
        assert!(text.ends_with("agent 0: 110 (-5) agent 1: 100 (+100)"));
    }

    #[test]
    fn test_agent_glyphs() {
        assert_eq!(agent_glyph(0), '0');
        assert_eq!(agent_glyph(9), '9');
        assert_eq!(agent_glyph(10), 'a');
    }
}
