use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    Position, Slot,
    item::Item,
    transaction::{PickTransaction, PutTransaction},
};

/// Represents misuse of a staging area.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StagingError {
    #[error("Staging-In still holds {count} item(s); a put can only be applied to an empty area")]
    StagingInOccupied { count: usize },
}

/// Behaviour shared by every fixed location on the floor.
pub trait Station {
    /// The blocked cell the station occupies.
    fn position(&self) -> Position;

    /// Cells from which the agent can reach the station.
    fn loading_positions(&self) -> &[Position];

    fn is_loading_position(&self, position: Position) -> bool {
        self.loading_positions().contains(&position)
    }
}

fn fmt_slots(f: &mut fmt::Formatter<'_>, items: &BTreeMap<Slot, Item>) -> fmt::Result {
    let rendered: Vec<String> = items
        .iter()
        .map(|(slot, item)| format!("Slot {}: {}", slot, item))
        .collect();
    write!(f, "{{ {} }}", rendered.join(", "))
}

/// A storage bin holding items keyed by slot.
///
/// Capacity is not enforced here; transaction generation keeps the total
/// number of items within `bin_slot_size * bins`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bin {
    position: Position,
    loading_positions: Vec<Position>,
    items: BTreeMap<Slot, Item>,
}

impl Bin {
    pub fn new(position: Position, loading_positions: Vec<Position>) -> Self {
        Bin {
            position,
            loading_positions,
            items: BTreeMap::new(),
        }
    }

    /// Stores `item` under its own slot.
    pub fn place_item(&mut self, item: Item) {
        self.items.insert(item.slot(), item);
    }

    pub fn remove_item(&mut self, slot: Slot) -> Option<Item> {
        self.items.remove(&slot)
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.items.contains_key(&slot)
    }

    /// Occupied slots in ascending order.
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.items.keys().copied()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Station for Bin {
    fn position(&self) -> Position {
        self.position
    }

    fn loading_positions(&self) -> &[Position] {
        &self.loading_positions
    }
}

impl fmt::Display for Bin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bin at {} with Items ", self.position)?;
        fmt_slots(f, &self.items)
    }
}

/// Entry point for put transactions. Items can only leave it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingIn {
    position: Position,
    loading_positions: Vec<Position>,
    items: BTreeMap<Slot, Item>,
    transaction: Option<PutTransaction>,
}

impl StagingIn {
    pub fn new(position: Position, loading_positions: Vec<Position>) -> Self {
        StagingIn {
            position,
            loading_positions,
            items: BTreeMap::new(),
            transaction: None,
        }
    }

    /// Installs the put's items and makes it the active transaction.
    pub fn apply_put(&mut self, put: &PutTransaction) -> Result<(), StagingError> {
        if !self.items.is_empty() {
            return Err(StagingError::StagingInOccupied {
                count: self.items.len(),
            });
        }
        self.items = put
            .items
            .iter()
            .map(|item| (item.slot(), item.clone()))
            .collect();
        self.transaction = Some(put.clone());
        Ok(())
    }

    pub fn transaction(&self) -> Option<&PutTransaction> {
        self.transaction.as_ref()
    }

    pub fn clear_transaction(&mut self) {
        self.transaction = None;
    }

    pub fn remove_item(&mut self, slot: Slot) -> Option<Item> {
        self.items.remove(&slot)
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.items.contains_key(&slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.items.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drops every waiting item. Returns how many were discarded.
    pub(crate) fn discard_items(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }

    /// True once every item of the active put sits in some bin.
    pub fn is_transaction_done(&self, bins: &[Bin]) -> bool {
        match &self.transaction {
            Some(put) => put.slots().all(|slot| bins.iter().any(|b| b.contains(slot))),
            None => false,
        }
    }
}

impl Station for StagingIn {
    fn position(&self) -> Position {
        self.position
    }

    fn loading_positions(&self) -> &[Position] {
        &self.loading_positions
    }
}

impl fmt::Display for StagingIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StagingIn: Bin at {} with Items ", self.position)?;
        fmt_slots(f, &self.items)?;
        match &self.transaction {
            Some(put) => {
                let slots: Vec<String> = put.slots().map(|s| s.to_string()).collect();
                write!(f, " » Transaction: Put with Items {}", slots.join(", "))
            }
            None => write!(f, " » Transaction: None"),
        }
    }
}

/// Exit point for pick transactions. Delivered items leave the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingOut {
    position: Position,
    loading_positions: Vec<Position>,
    transaction: Option<PickTransaction>,
    incoming: Vec<Slot>,
}

impl StagingOut {
    pub fn new(position: Position, loading_positions: Vec<Position>) -> Self {
        StagingOut {
            position,
            loading_positions,
            transaction: None,
            incoming: Vec::new(),
        }
    }

    /// Queues the pick's slots as owed deliveries and makes it the active transaction.
    pub fn apply_pick(&mut self, pick: &PickTransaction) {
        self.incoming.extend_from_slice(&pick.slot_ids);
        self.transaction = Some(pick.clone());
    }

    pub fn transaction(&self) -> Option<&PickTransaction> {
        self.transaction.as_ref()
    }

    pub fn clear_transaction(&mut self) {
        self.transaction = None;
    }

    /// Slots still owed to this area.
    pub fn incoming(&self) -> &[Slot] {
        &self.incoming
    }

    pub fn expects(&self, slot: Slot) -> bool {
        self.incoming.contains(&slot)
    }

    /// Checks `slot` off the incoming list. Returns false if it was not owed.
    pub fn receive(&mut self, slot: Slot) -> bool {
        match self.incoming.iter().position(|owed| *owed == slot) {
            Some(index) => {
                self.incoming.remove(index);
                true
            }
            None => false,
        }
    }

    /// Forgets every owed delivery. Returns how many were pending.
    pub(crate) fn discard_incoming(&mut self) -> usize {
        let count = self.incoming.len();
        self.incoming.clear();
        count
    }

    pub fn is_transaction_done(&self) -> bool {
        self.incoming.is_empty()
    }
}

impl Station for StagingOut {
    fn position(&self) -> Position {
        self.position
    }

    fn loading_positions(&self) -> &[Position] {
        &self.loading_positions
    }
}

impl fmt::Display for StagingOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let incoming: Vec<String> = self.incoming.iter().map(|s| s.to_string()).collect();
        write!(
            f,
            "StagingOut: Bin at {} with Items {{ {} }}",
            self.position,
            incoming.join(", ")
        )?;
        match &self.transaction {
            Some(pick) => {
                let slots: Vec<String> = pick.slot_ids.iter().map(|s| s.to_string()).collect();
                write!(f, " » Transaction: Pick with Items {}", slots.join(", "))
            }
            None => write!(f, " » Transaction: None"),
        }
    }
}
