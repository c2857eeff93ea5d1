use std::fmt;

use serde::{Deserialize, Serialize};

pub mod agent;
pub mod environment;
pub mod item;
pub mod layout;
pub mod map;
pub mod observation;
pub mod policy;
pub mod rollout;
pub mod storage;
pub mod transaction;

/// Unique identity of an item, also used as its storage key. Generated slots start at 1.
pub type Slot = usize;

/// Scalar feedback returned for every step.
pub type Reward = f32;

/// Penalty for an action that could not be carried out. State is left untouched.
pub const INVALID_ACTION: Reward = -0.5;
/// Reward for a valid action that makes no progress on the active transaction.
pub const NEUTRAL_ACTION: Reward = 0.0;
/// Reward for an action that moves an item of the active transaction forward.
pub const GOOD_ACTION: Reward = 5.0;

/// Represents a cell on the warehouse floor as (row, col), 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }

    /// Returns the neighbouring cell in `direction`.
    ///
    /// Returns `None` if the move would leave the grid through row or column 0.
    /// Upper bounds are the floor grid's concern.
    pub fn step(self, direction: Direction) -> Option<Position> {
        let (row, col) = match direction {
            Direction::Up => (self.row.checked_sub(1)?, self.col),
            Direction::Down => (self.row.checked_add(1)?, self.col),
            Direction::Left => (self.row, self.col.checked_sub(1)?),
            Direction::Right => (self.row, self.col.checked_add(1)?),
        };
        Some(Position { row, col })
    }
}

impl From<(usize, usize)> for Position {
    fn from((row, col): (usize, usize)) -> Self {
        Position { row, col }
    }
}

impl From<Position> for (usize, usize) {
    fn from(position: Position) -> Self {
        (position.row, position.col)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// The four movement directions. The discriminant is the movement action index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}
