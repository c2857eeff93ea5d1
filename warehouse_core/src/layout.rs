use serde::{Deserialize, Serialize};

use crate::{
    Position,
    map::{Cell, Grid, GridError},
};

/// Represents errors found while loading or checking a layout.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("Failed to parse layout: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Layout grid must be at least 1x1, got ({height}, {width})")]
    EmptyGrid { height: usize, width: usize },
    #[error("Layout has no bins")]
    NoBins,
    #[error("bin-slot-size must be at least 1")]
    ZeroSlotSize,
    #[error("{what} at {position} lies outside the grid")]
    OutOfBounds { what: String, position: Position },
    #[error("Two stations share the cell {position}")]
    Overlap { position: Position },
    #[error("{what} at {position} is on a blocked cell")]
    Blocked { what: String, position: Position },
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// A bin or staging area: the cell it blocks and the cells it is served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationLayout {
    pub position: Position,
    pub loading: Vec<Position>,
}

/// Parsed warehouse layout.
///
/// ```toml
/// height = 4
/// width = 5
/// bin-slot-size = 2
/// agent-start = [3, 0]
///
/// [[bins]]
/// position = [0, 0]
/// loading = [[1, 0]]
///
/// [staging-in]
/// position = [3, 4]
/// loading = [[2, 4]]
///
/// [staging-out]
/// position = [0, 4]
/// loading = [[1, 4]]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Layout {
    pub height: usize,
    pub width: usize,
    pub bin_slot_size: usize,
    pub agent_start: Position,
    pub bins: Vec<StationLayout>,
    pub staging_in: StationLayout,
    pub staging_out: StationLayout,
}

impl Layout {
    /// Parses a TOML layout and validates it.
    pub fn from_toml_str(source: &str) -> Result<Self, LayoutError> {
        let layout: Layout = toml::from_str(source)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Upper bound on the number of items in the warehouse; also the number of slot identities.
    pub fn max_items_in_env(&self) -> usize {
        self.bin_slot_size * self.bins.len()
    }

    fn stations(&self) -> impl Iterator<Item = (String, &StationLayout, Cell)> {
        self.bins
            .iter()
            .enumerate()
            .map(|(index, bin)| (format!("Bin {}", index), bin, Cell::Bin(index)))
            .chain([
                ("Staging-In".to_string(), &self.staging_in, Cell::StagingIn),
                ("Staging-Out".to_string(), &self.staging_out, Cell::StagingOut),
            ])
    }

    /// Builds the floor grid, rejecting stations outside the grid or sharing a cell.
    pub fn floor_plan(&self) -> Result<Grid<Cell>, LayoutError> {
        if self.height == 0 || self.width == 0 {
            return Err(LayoutError::EmptyGrid {
                height: self.height,
                width: self.width,
            });
        }
        let mut floor: Grid<Cell> = Grid::new(self.height, self.width);
        for (what, station, cell) in self.stations() {
            match floor.get(station.position) {
                None => {
                    return Err(LayoutError::OutOfBounds {
                        what,
                        position: station.position,
                    });
                }
                Some(existing) if existing.is_blocked() => {
                    return Err(LayoutError::Overlap {
                        position: station.position,
                    });
                }
                Some(_) => floor.set(station.position, cell)?,
            }
        }
        Ok(floor)
    }

    /// Checks that the layout can host an environment.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.bins.is_empty() {
            return Err(LayoutError::NoBins);
        }
        if self.bin_slot_size == 0 {
            return Err(LayoutError::ZeroSlotSize);
        }
        let floor = self.floor_plan()?;

        for (what, station, _) in self.stations() {
            for position in &station.loading {
                let what = format!("Loading position of {}", what);
                match floor.get(*position) {
                    None => {
                        return Err(LayoutError::OutOfBounds {
                            what,
                            position: *position,
                        });
                    }
                    Some(cell) if cell.is_blocked() => {
                        return Err(LayoutError::Blocked {
                            what,
                            position: *position,
                        });
                    }
                    Some(_) => {}
                }
            }
        }

        match floor.get(self.agent_start) {
            None => Err(LayoutError::OutOfBounds {
                what: "Agent start".to_string(),
                position: self.agent_start,
            }),
            Some(cell) if cell.is_blocked() => Err(LayoutError::Blocked {
                what: "Agent start".to_string(),
                position: self.agent_start,
            }),
            Some(_) => Ok(()),
        }
    }
}
