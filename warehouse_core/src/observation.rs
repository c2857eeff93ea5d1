use serde::{Deserialize, Serialize};

use crate::Position;

/// A dense (height, width, channels) tensor of the observable state.
///
/// Values are stored row-major with the channel as the fastest axis, so
/// [`Observation::as_slice`] matches the layout of an `(H, W, C)` array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    height: usize,
    width: usize,
    channels: usize,
    data: Vec<i8>,
}

impl Observation {
    /// Creates an all-zero tensor.
    ///
    /// # Panics
    ///
    /// Panics if the element count overflows `usize`.
    pub fn zeros(height: usize, width: usize, channels: usize) -> Self {
        let size = height
            .checked_mul(width)
            .and_then(|cells| cells.checked_mul(channels))
            .expect("Observation size overflow");
        Observation {
            height,
            width,
            channels,
            data: vec![0; size],
        }
    }

    /// Returns `(height, width, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    #[inline]
    fn offset(&self, position: Position, channel: usize) -> Option<usize> {
        if position.row < self.height && position.col < self.width && channel < self.channels {
            Some((position.row * self.width + position.col) * self.channels + channel)
        } else {
            None
        }
    }

    /// Returns the value at `position` in `channel`, or `None` if out of range.
    pub fn get(&self, position: Position, channel: usize) -> Option<i8> {
        self.data.get(self.offset(position, channel)?).copied()
    }

    /// Writes `value`; writes outside the tensor are ignored.
    pub(crate) fn set(&mut self, position: Position, channel: usize, value: i8) {
        if let Some(offset) = self.offset(position, channel) {
            self.data[offset] = value;
        }
    }

    /// Positions holding a nonzero value in `channel`, with that value.
    pub fn nonzero_in_channel(&self, channel: usize) -> Vec<(Position, i8)> {
        if channel >= self.channels {
            return Vec::new();
        }
        (0..self.height)
            .flat_map(|row| (0..self.width).map(move |col| Position::new(row, col)))
            .filter_map(|position| match self.get(position, channel) {
                Some(0) | None => None,
                Some(value) => Some((position, value)),
            })
            .collect()
    }

    pub fn as_slice(&self) -> &[i8] {
        &self.data
    }
}
