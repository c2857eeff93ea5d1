use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Slot;

/// One warehouse unit. Its slot is unique across the environment while it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    slot: Slot,
    first_remove_from_bin_rewarded: bool,
    first_place_in_bin_rewarded: bool,
}

impl Item {
    pub fn new(slot: Slot) -> Self {
        Item {
            slot,
            first_remove_from_bin_rewarded: false,
            first_place_in_bin_rewarded: false,
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn first_remove_from_bin_rewarded(&self) -> bool {
        self.first_remove_from_bin_rewarded
    }

    pub fn first_place_in_bin_rewarded(&self) -> bool {
        self.first_place_in_bin_rewarded
    }

    /// Marks the first removal from a bin. Returns false if it was already marked.
    pub(crate) fn claim_first_remove_from_bin(&mut self) -> bool {
        !std::mem::replace(&mut self.first_remove_from_bin_rewarded, true)
    }

    /// Marks the first placement into a bin. Returns false if it was already marked.
    pub(crate) fn claim_first_place_in_bin(&mut self) -> bool {
        !std::mem::replace(&mut self.first_place_in_bin_rewarded, true)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slot)
    }
}
