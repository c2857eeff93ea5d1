use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::Position;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Position {position} is out of bounds for grid size ({height}, {width})")]
    OutOfBounds {
        position: Position,
        height: usize,
        width: usize,
    },
}

/// What occupies a cell of the warehouse floor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Floor,
    /// A storage bin, identified by its index in the environment's bin list.
    Bin(usize),
    StagingIn,
    StagingOut,
}

impl Cell {
    /// Bins and staging areas can not be entered by the agent.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        !matches!(self, Cell::Floor)
    }
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order and is
/// addressed by [`Position`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    height: usize,
    width: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `height * width` overflows `usize`.
    pub fn new(height: usize, width: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = height.checked_mul(width).expect("Grid size overflow");
        Grid {
            height,
            width,
            cells: vec![T::default(); size],
        }
    }

    /// Returns the number of rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Converts a position to a flat vector index.
    ///
    /// Returns `None` if the position is out of bounds.
    #[inline]
    fn position_to_index(&self, position: Position) -> Option<usize> {
        if self.contains(position) {
            Some(position.row * self.width + position.col)
        } else {
            None
        }
    }

    /// Checks if the given position lies within the grid boundaries.
    #[inline]
    pub fn contains(&self, position: Position) -> bool {
        position.row < self.height && position.col < self.width
    }

    /// Gets an immutable reference to the cell at the given position.
    ///
    /// Returns `None` if the position is out of bounds.
    pub fn get(&self, position: Position) -> Option<&T> {
        self.cells.get(self.position_to_index(position)?)
    }

    /// Sets the value of the cell at the given position.
    ///
    /// Returns `Err(GridError::OutOfBounds)` if the position is invalid.
    pub fn set(&mut self, position: Position, value: T) -> Result<(), GridError> {
        let index = self
            .position_to_index(position)
            .ok_or(GridError::OutOfBounds {
                position,
                height: self.height,
                width: self.width,
            })?;
        self.cells[index] = value;
        Ok(())
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell in row-major order.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Position::new(index / width, index % width), cell))
    }
}

impl Grid<Cell> {
    /// Returns true if the agent may stand on `position`.
    pub fn is_walkable(&self, position: Position) -> bool {
        matches!(self.get(position), Some(Cell::Floor))
    }

    /// Iterates over every blocked position in row-major order.
    pub fn blocked_positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.enumerate()
            .filter(|(_, cell)| cell.is_blocked())
            .map(|(position, _)| position)
    }
}

/// Indexing using Position coordinates for access
impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, position: Position) -> &Self::Output {
        match self.position_to_index(position) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                position, self.height, self.width
            ),
        }
    }
}

/// Indexing using Position coordinates for mutable access
impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, position: Position) -> &mut Self::Output {
        let height = self.height;
        let width = self.width;
        match self.position_to_index(position) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                position, height, width
            ),
        }
    }
}
