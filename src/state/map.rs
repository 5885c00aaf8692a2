use crate::infra::{Action, Position};
use crate::state::EnvError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Wall,
    Floor,
}

/// Static warehouse grid stored as a flat, row-major tile array.
#[derive(Clone, Debug)]
pub struct Map {
    pub width: i32,
    pub height: i32,
    tiles: Vec<Tile>,
    rows: Vec<String>,
}

impl Map {
    /// Parses a text map where `#` marks a wall and any other character is floor.
    pub fn parse(text: &str) -> Result<Self, EnvError> {
        let rows: Vec<String> = text
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .filter(|line| !line.is_empty())
            .collect();
        Self::from_rows(rows)
    }

    pub fn from_rows(rows: Vec<String>) -> Result<Self, EnvError> {
        let Some(first) = rows.first() else {
            return Err(EnvError::EmptyMap);
        };
        let width = first.chars().count();
        if width == 0 {
            return Err(EnvError::EmptyMap);
        }

        let mut tiles = Vec::with_capacity(width * rows.len());
        for (row, line) in rows.iter().enumerate() {
            let found = line.chars().count();
            if found != width {
                return Err(EnvError::RaggedMap {
                    row,
                    found,
                    expected: width,
                });
            }
            tiles.extend(line.chars().map(|c| if c == '#' { Tile::Wall } else { Tile::Floor }));
        }

        Ok(Self {
            width: width as i32,
            height: rows.len() as i32,
            tiles,
            rows,
        })
    }

    pub fn in_bounds(&self, pos: &Position) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    /// Linearized key of an in-bounds cell.
    pub fn index(&self, pos: &Position) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| (pos.y * self.width + pos.x) as usize)
    }

    pub fn position(&self, index: usize) -> Position {
        let width = self.width as usize;
        Position::new((index % width) as i32, (index / width) as i32)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, pos: &Position) -> Option<Tile> {
        self.index(pos).map(|i| self.tiles[i])
    }

    pub fn is_free(&self, pos: &Position) -> bool {
        matches!(self.get(pos), Some(Tile::Floor))
    }

    /// Cell reached from `pos` by `action`; off-grid or wall moves collapse to staying.
    pub fn next_pos(&self, pos: Position, action: Action) -> Position {
        let next = pos.step(action);
        if self.is_free(&next) { next } else { pos }
    }

    /// Move actions that actually change cell when taken from `pos`.
    pub fn valid_moves(&self, pos: Position) -> Vec<Action> {
        Action::MOVES
            .into_iter()
            .filter(|&action| self.next_pos(pos, action) != pos)
            .collect()
    }

    pub fn free_cells(&self) -> impl Iterator<Item = Position> + '_ {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, tile)| **tile == Tile::Floor)
            .map(|(i, _)| self.position(i))
    }

    /// Source rows, used for text rendering.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }
}
