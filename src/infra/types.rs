use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn neighbors(&self) -> [Position; 4] {
        [
            Position::new(self.x, self.y - 1), // North
            Position::new(self.x, self.y + 1), // South
            Position::new(self.x - 1, self.y), // West
            Position::new(self.x + 1, self.y), // East
        ]
    }

    /// Cell reached by `action` on an unbounded grid. Non-move actions stay put.
    pub fn step(&self, action: Action) -> Position {
        match action {
            Action::Up => Position::new(self.x, self.y - 1),
            Action::Down => Position::new(self.x, self.y + 1),
            Action::Left => Position::new(self.x - 1, self.y),
            Action::Right => Position::new(self.x + 1, self.y),
            Action::Stay | Action::Pickup | Action::Clear => *self,
        }
    }
}

/// Everything an agent can do in one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    Up,
    Down,
    Left,
    Right,
    Stay,
    Pickup,
    Clear,
}

impl Action {
    pub const COUNT: usize = 7;

    pub const ALL: [Action; Action::COUNT] = [
        Action::Up,
        Action::Down,
        Action::Left,
        Action::Right,
        Action::Stay,
        Action::Pickup,
        Action::Clear,
    ];

    pub const MOVES: [Action; 4] = [Action::Up, Action::Down, Action::Left, Action::Right];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Up => "UP",
            Action::Down => "DOWN",
            Action::Left => "LEFT",
            Action::Right => "RIGHT",
            Action::Stay => "STAY",
            Action::Pickup => "PICKUP",
            Action::Clear => "CLEAR",
        }
    }
}
